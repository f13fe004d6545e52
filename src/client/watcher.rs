// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Incoming-Transfer Watcher
//!
//! Background task crediting transfers that involve the local account.
//!
//! ## Strategy
//!
//! 1. Poll [`Ledger::transfer_events`] from a block checkpoint.
//! 2. Skip events whose hash the client submitted itself; those were
//!    booked when the transfer confirmed.
//! 3. For every other event naming the local key, credit whatever decrypts
//!    to a positive amount. Events from an epoch the local state has already
//!    rolled past credit the available balance, later ones the pending.
//!
//! ## Checkpointing
//!
//! The checkpoint only advances past fully handled blocks. When an event
//! fails, the watcher resumes at its block and skips the events of that
//! block it already handled.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::Client;
use crate::account::epoch_of;
use crate::error::ClientError;
use crate::ledger::{Ledger, TransferEvent, TxHash};
use crate::proof::Prover;

impl<L: Ledger, P: Prover> Client<L, P> {
    /// Credit the local account from one confirmed transfer event.
    ///
    /// Returns the amount credited, or `None` when the event was
    /// self-originated or did not involve the local account.
    pub async fn handle_transfer_event(
        &self,
        event: &TransferEvent,
    ) -> Result<Option<u64>, ClientError> {
        if self.in_flight.lock().await.remove(&event.tx_hash) {
            tracing::debug!(tx_hash = %event.tx_hash, "Skipping self-originated transfer");
            return Ok(None);
        }

        let Some(session) = self.session.read().await.clone() else {
            return Ok(None);
        };
        let public_key = session.keypair.public();

        let positions: Vec<usize> = event
            .participants
            .iter()
            .enumerate()
            .filter(|(_, key)| **key == public_key)
            .map(|(index, _)| index)
            .collect();
        let is_beneficiary = event.beneficiary == Some(public_key);
        if positions.is_empty() && !is_beneficiary {
            return Ok(None);
        }

        let timestamp = self.ledger.block_timestamp(event.block_number).await?;
        let epoch = epoch_of(timestamp, session.scheduler.epoch_length().as_secs());

        let mut credited = 0u64;
        let mut state = self.state.lock().await;

        for index in positions {
            let value = event
                .delta(index)
                .and_then(|delta| delta.read_balance(session.keypair.secret()))
                .unwrap_or(0);
            if value > 0 {
                state.credit_at(epoch, value);
                credited += value;
                tracing::info!(
                    tx_hash = %event.tx_hash,
                    amount = value,
                    balance = state.balance(),
                    "Transfer received"
                );
            }
        }

        if is_beneficiary && session.fee > 0 {
            state.credit_at(epoch, session.fee);
            credited += session.fee;
            tracing::info!(
                tx_hash = %event.tx_hash,
                fee = session.fee,
                balance = state.balance(),
                "Fee received"
            );
        }

        Ok((credited > 0).then_some(credited))
    }
}

/// Polls the ledger for transfer events and feeds them to a [`Client`].
pub struct TransferWatcher<L, P> {
    client: Arc<Client<L, P>>,
    poll_interval: Duration,
    next_block: u64,
    /// Events of block `next_block` handled before a failure.
    handled: HashSet<TxHash>,
}

impl<L: Ledger, P: Prover> TransferWatcher<L, P> {
    pub fn new(client: Arc<Client<L, P>>) -> Self {
        let poll_interval = client.config().watch_interval();
        Self {
            client,
            poll_interval,
            next_block: 0,
            handled: HashSet::new(),
        }
    }

    /// Skip everything before `block`.
    pub fn starting_at(mut self, block: u64) -> Self {
        self.next_block = block;
        self
    }

    pub fn next_block(&self) -> u64 {
        self.next_block
    }

    /// Run the watcher loop until the cancellation token is triggered.
    ///
    /// ```rust,ignore
    /// tokio::spawn(watcher.run(shutdown.clone()));
    /// ```
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(from_block = self.next_block, "Transfer watcher starting");

        loop {
            if shutdown.is_cancelled() {
                tracing::info!("Transfer watcher shutting down");
                return;
            }

            if let Err(e) = self.step().await {
                tracing::warn!(error = %e, "Watcher step failed, will retry");
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = shutdown.cancelled() => {
                    tracing::info!("Transfer watcher shutting down");
                    return;
                }
            }
        }
    }

    /// Handle every event from the checkpoint to the ledger head. Returns the
    /// total amount credited.
    pub async fn step(&mut self) -> Result<u64, ClientError> {
        let batch = self.client.ledger().transfer_events(self.next_block).await?;

        let mut credited = 0u64;
        let mut done: Vec<(u64, TxHash)> = Vec::new();
        for event in &batch.events {
            if self.handled.contains(&event.tx_hash) {
                continue;
            }
            match self.client.handle_transfer_event(event).await {
                Ok(amount) => credited += amount.unwrap_or(0),
                Err(e) => {
                    let block = event.block_number;
                    if block != self.next_block {
                        self.handled.clear();
                    }
                    self.handled.extend(
                        done.iter()
                            .filter(|(done_block, _)| *done_block == block)
                            .map(|(_, hash)| *hash),
                    );
                    self.next_block = block;
                    return Err(e);
                }
            }
            done.push((event.block_number, event.tx_hash));
        }

        if !batch.events.is_empty() {
            tracing::debug!(
                from_block = self.next_block,
                to_block = batch.next_block.saturating_sub(1),
                events = batch.events.len(),
                "Processed transfer events"
            );
        }
        self.handled.clear();
        self.next_block = batch.next_block.max(self.next_block);
        Ok(credited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use alloy::primitives::Address;
    use async_trait::async_trait;

    use crate::account::Epoch;
    use crate::config::ClientConfig;
    use crate::crypto::{Ciphertext, PublicKey, RegistrationSignature};
    use crate::ledger::{
        EventBatch, LedgerError, MemoryLedger, Submitted, TransferRequest, TxReceipt,
        WithdrawRequest,
    };
    use crate::proof::{
        BurnProof, BurnStatement, BurnWitness, ProofError, TransferProof, TransferStatement,
        TransferWitness,
    };
    use crate::schedule::{Clock, ManualClock};

    struct AcceptingProver;

    impl Prover for AcceptingProver {
        fn prove_burn(
            &self,
            _statement: &BurnStatement,
            _witness: &BurnWitness<'_>,
        ) -> Result<BurnProof, ProofError> {
            Ok(BurnProof::from_bytes(vec![1]))
        }

        fn prove_transfer(
            &self,
            _statement: &TransferStatement,
            _witness: &TransferWitness<'_>,
        ) -> Result<TransferProof, ProofError> {
            Ok(TransferProof::from_bytes(vec![2]))
        }
    }

    type TestClient = Client<Arc<MemoryLedger>, AcceptingProver>;

    /// Reports every event in one block and fails a single timestamp lookup.
    struct FlakyLedger {
        inner: Arc<MemoryLedger>,
        timestamp_calls: AtomicUsize,
        fail_on_call: usize,
    }

    #[async_trait]
    impl Ledger for FlakyLedger {
        async fn epoch_length(&self) -> Result<u64, LedgerError> {
            self.inner.epoch_length().await
        }

        async fn fee(&self) -> Result<u64, LedgerError> {
            self.inner.fee().await
        }

        fn contract_address(&self) -> Address {
            self.inner.contract_address()
        }

        fn sender_address(&self) -> Address {
            self.inner.sender_address()
        }

        async fn simulate_accounts(
            &self,
            keys: &[PublicKey],
            epoch: Epoch,
        ) -> Result<Vec<Ciphertext>, LedgerError> {
            self.inner.simulate_accounts(keys, epoch).await
        }

        async fn register(
            &self,
            key: &PublicKey,
            signature: &RegistrationSignature,
        ) -> Result<Submitted, LedgerError> {
            self.inner.register(key, signature).await
        }

        async fn deposit(&self, key: &PublicKey, amount: u64) -> Result<Submitted, LedgerError> {
            self.inner.deposit(key, amount).await
        }

        async fn withdraw(&self, request: WithdrawRequest) -> Result<Submitted, LedgerError> {
            self.inner.withdraw(request).await
        }

        async fn transfer(&self, request: TransferRequest) -> Result<Submitted, LedgerError> {
            self.inner.transfer(request).await
        }

        async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, LedgerError> {
            self.inner.wait_for_confirmation(tx_hash).await
        }

        async fn transfer_events(&self, from_block: u64) -> Result<EventBatch, LedgerError> {
            let mut batch = self.inner.transfer_events(from_block).await?;
            if let Some(block) = batch.events.first().map(|event| event.block_number) {
                for event in &mut batch.events {
                    event.block_number = block;
                }
            }
            Ok(batch)
        }

        async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
            let call = self.timestamp_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call == self.fail_on_call {
                return Err(LedgerError::Rpc("connection reset".to_string()));
            }
            self.inner.block_timestamp(block_number).await
        }
    }

    struct Network {
        clock: Arc<ManualClock>,
        ledger: Arc<MemoryLedger>,
    }

    impl Network {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(Duration::from_secs(1_200)));
            let ledger = Arc::new(MemoryLedger::new(12, 1, clock.clone()));
            Self { clock, ledger }
        }

        async fn member(&self) -> Arc<TestClient> {
            let client = Client::new(
                self.ledger.clone(),
                AcceptingProver,
                self.clock.clone() as Arc<dyn Clock>,
                ClientConfig::default(),
            );
            client.register(None).await.unwrap();
            Arc::new(client)
        }

        fn next_epoch(&self) {
            self.clock.advance(Duration::from_secs(12));
        }
    }

    /// Alice funded with 100 and knowing bob, one epoch after deposit.
    async fn funded_pair(network: &Network) -> (Arc<TestClient>, Arc<TestClient>) {
        let alice = network.member().await;
        let bob = network.member().await;
        network.next_epoch();
        alice.deposit(100).await.unwrap();
        network.next_epoch();
        alice
            .add_friend("bob", bob.public_key().await.unwrap())
            .await;
        (alice, bob)
    }

    #[tokio::test]
    async fn recipient_is_credited_once() {
        let network = Network::new();
        let (alice, bob) = funded_pair(&network).await;
        alice.transfer("bob", 10, &[], None).await.unwrap();

        let mut watcher = TransferWatcher::new(bob.clone());
        assert_eq!(watcher.step().await.unwrap(), 10);
        assert_eq!(bob.balance().await, 10);
        assert_eq!(bob.state().await.pending, 10);

        assert_eq!(watcher.step().await.unwrap(), 0);
        assert_eq!(bob.balance().await, 10);

        network.next_epoch();
        assert_eq!(bob.state().await.available, 10);
    }

    #[tokio::test]
    async fn late_event_after_rollover_is_spendable() {
        let network = Network::new();
        let (alice, bob) = funded_pair(&network).await;
        alice.transfer("bob", 10, &[], None).await.unwrap();

        network.next_epoch();
        bob.deposit(5).await.unwrap();

        let mut watcher = TransferWatcher::new(bob.clone());
        assert_eq!(watcher.step().await.unwrap(), 10);
        let state = bob.state().await;
        assert_eq!(state.available, 10);
        assert_eq!(state.pending, 5);

        let now = network.clock.now();
        let receipt = bob.withdraw(10).await.unwrap();
        assert_eq!(network.clock.now(), now);
        assert_eq!(receipt.balance, 5);
    }

    #[tokio::test]
    async fn failed_step_resumes_without_double_credit() {
        let network = Network::new();
        let flaky = FlakyLedger {
            inner: network.ledger.clone(),
            timestamp_calls: AtomicUsize::new(0),
            fail_on_call: 2,
        };
        let bob = Arc::new(Client::new(
            flaky,
            AcceptingProver,
            network.clock.clone() as Arc<dyn Clock>,
            ClientConfig::default(),
        ));
        bob.register(None).await.unwrap();
        let alice = network.member().await;
        let carol = network.member().await;
        let dave = network.member().await;
        network.next_epoch();
        alice.deposit(100).await.unwrap();
        bob.deposit(100).await.unwrap();
        dave.deposit(100).await.unwrap();
        network.next_epoch();

        let bob_key = bob.public_key().await.unwrap();
        alice.add_friend("bob", bob_key).await;
        dave.add_friend("bob", bob_key).await;
        bob.add_friend("carol", carol.public_key().await.unwrap())
            .await;

        alice.transfer("bob", 10, &[], None).await.unwrap();
        let sent = bob.transfer("carol", 20, &[], None).await.unwrap();
        assert_eq!(sent.balance, 79);
        dave.transfer("bob", 7, &[], None).await.unwrap();

        let first_block = network.ledger.transfer_events(0).await.unwrap().events[0].block_number;
        let mut watcher = TransferWatcher::new(bob.clone());
        assert!(watcher.step().await.is_err());
        assert_eq!(watcher.next_block(), first_block);
        assert_eq!(bob.balance().await, 89);
        assert!(bob.in_flight.lock().await.is_empty());

        assert_eq!(watcher.step().await.unwrap(), 7);
        assert_eq!(bob.balance().await, 96);
        assert_eq!(watcher.step().await.unwrap(), 0);
        assert_eq!(bob.balance().await, 96);
    }

    #[tokio::test]
    async fn own_transfer_is_not_booked_twice() {
        let network = Network::new();
        let (alice, _bob) = funded_pair(&network).await;
        let receipt = alice.transfer("bob", 10, &[], None).await.unwrap();
        assert_eq!(receipt.balance, 89);

        let mut watcher = TransferWatcher::new(alice.clone());
        assert_eq!(watcher.step().await.unwrap(), 0);
        assert_eq!(alice.balance().await, 89);
        assert!(alice.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn beneficiary_receives_the_fee() {
        let network = Network::new();
        let alice = network.member().await;
        let bob = network.member().await;
        let carol = network.member().await;
        network.next_epoch();
        alice.deposit(50).await.unwrap();
        network.next_epoch();
        alice.add_friend("bob", bob.public_key().await.unwrap()).await;
        alice
            .add_friend("carol", carol.public_key().await.unwrap())
            .await;

        let receipt = alice.transfer("bob", 5, &[], Some("carol")).await.unwrap();
        assert_eq!(receipt.balance, 44);

        let mut watcher = TransferWatcher::new(carol.clone());
        assert_eq!(watcher.step().await.unwrap(), 1);
        assert_eq!(carol.balance().await, 1);
    }

    #[tokio::test]
    async fn unrelated_and_unregistered_clients_ignore_events() {
        let network = Network::new();
        let (alice, _bob) = funded_pair(&network).await;
        let dave = network.member().await;
        alice.transfer("bob", 10, &[], None).await.unwrap();

        let mut watcher = TransferWatcher::new(dave.clone());
        assert_eq!(watcher.step().await.unwrap(), 0);
        assert_eq!(dave.balance().await, 0);

        let stranger = Client::new(
            network.ledger.clone(),
            AcceptingProver,
            network.clock.clone() as Arc<dyn Clock>,
            ClientConfig::default(),
        );
        let batch = network.ledger.transfer_events(0).await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(
            stranger.handle_transfer_event(&batch.events[0]).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn checkpoint_skips_earlier_blocks() {
        let network = Network::new();
        let (alice, bob) = funded_pair(&network).await;
        alice.transfer("bob", 10, &[], None).await.unwrap();

        let head = network.ledger.transfer_events(0).await.unwrap().next_block;
        let mut watcher = TransferWatcher::new(bob.clone()).starting_at(head);
        assert_eq!(watcher.step().await.unwrap(), 0);
        assert_eq!(watcher.next_block(), head);
        assert_eq!(bob.balance().await, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let network = Network::new();
        let bob = network.member().await;
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(
            Duration::from_secs(1),
            TransferWatcher::new(bob).run(shutdown),
        )
        .await
        .unwrap();
    }
}
