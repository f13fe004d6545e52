// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JSON-RPC adapter for a deployed ZSC contract.
//!
//! ## Transfer events
//!
//! `TransferOccurred` only names the parties and the beneficiary. The
//! per-party ciphertexts needed to decrypt an incoming amount live in the
//! `zTransfer` calldata, so every matching log is followed by a transaction
//! lookup and the calldata is decoded against the contract ABI.

use std::time::Duration;

use alloy::{
    consensus::Transaction as _,
    network::{Ethereum, EthereumWallet},
    primitives::{Address, Bytes, B256, U256},
    providers::{
        fillers::{
            BlobGasFiller, ChainIdFiller, FillProvider, GasFiller, JoinFill, NonceFiller,
            WalletFiller,
        },
        Identity, Provider, ProviderBuilder, RootProvider,
    },
    rpc::types::{BlockNumberOrTag, Filter},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::{SolCall, SolEvent},
};
use async_trait::async_trait;

use super::{
    EventBatch, Ledger, LedgerError, Submitted, TransferEvent, TransferRequest, TxHash, TxReceipt,
    WithdrawRequest,
};
use crate::account::Epoch;
use crate::config::{ClientConfig, CONTRACT_ENV, RPC_URL_ENV, SENDER_KEY_ENV};
use crate::crypto::wire::{decode_point, encode_point, scalar_to_word};
use crate::crypto::{Ciphertext, ProjectivePoint, PublicKey, RegistrationSignature, WirePoint};

sol! {
    #[sol(rpc)]
    interface IZSC {
        event TransferOccurred(bytes32[2][] parties, bytes32[2] beneficiary);

        function register(bytes32[2] y, uint256 c, uint256 s) external;
        function zDeposit(bytes32[2] y, uint256 bTransfer) external;
        function zWithdraw(bytes32[2] y, uint256 bTransfer, bytes32[2] u, bytes proof) external;
        function zTransfer(
            bytes32[2][] C,
            bytes32[2] D,
            bytes32[2][] y,
            bytes32[2] u,
            bytes proof,
            bytes32[2] beneficiary
        ) external;
        function simulateAccounts(bytes32[2][] y, uint256 epoch) external view returns (bytes32[2][2][] accounts);
        function getEpochLength() external view returns (uint256);
        function getFee() external view returns (uint256);
    }
}

/// HTTP provider with the recommended fillers and a local signing wallet.
pub type SignedHttpProvider = FillProvider<
    JoinFill<
        JoinFill<
            Identity,
            JoinFill<GasFiller, JoinFill<BlobGasFiller, JoinFill<NonceFiller, ChainIdFiller>>>,
        >,
        WalletFiller<EthereumWallet>,
    >,
    RootProvider<Ethereum>,
>;

/// Default block span per `eth_getLogs` query.
const DEFAULT_CHUNK_SIZE: u64 = 2000;

/// Connection settings for [`ZscLedger::connect`].
#[derive(Debug, Clone)]
pub struct ZscSettings {
    pub rpc_url: url::Url,
    pub contract: Address,
    pub signer: PrivateKeySigner,
}

impl ZscSettings {
    pub fn from_env() -> Result<Self, LedgerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, LedgerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name).ok_or_else(|| LedgerError::Configuration(format!("{name} is not set")))
        };

        let rpc_url = required(RPC_URL_ENV)?
            .parse()
            .map_err(|e: url::ParseError| LedgerError::Configuration(format!("{RPC_URL_ENV}: {e}")))?;
        let contract = required(CONTRACT_ENV)?
            .parse()
            .map_err(|e| LedgerError::Configuration(format!("{CONTRACT_ENV}: {e}")))?;
        let key_bytes = alloy::hex::decode(required(SENDER_KEY_ENV)?.trim())
            .map_err(|e| LedgerError::Configuration(format!("{SENDER_KEY_ENV}: {e}")))?;
        let signer = PrivateKeySigner::from_slice(&key_bytes)
            .map_err(|e| LedgerError::Configuration(format!("{SENDER_KEY_ENV}: {e}")))?;

        Ok(Self {
            rpc_url,
            contract,
            signer,
        })
    }
}

/// Ledger backed by a ZSC contract reachable over JSON-RPC.
pub struct ZscLedger<P> {
    provider: P,
    contract: IZSC::IZSCInstance<P>,
    address: Address,
    sender: Address,
    confirmation_poll: Duration,
    confirmation_timeout: Duration,
    chunk_size: u64,
}

impl ZscLedger<SignedHttpProvider> {
    /// Connect over HTTP, signing submissions with `settings.signer`.
    pub fn connect(settings: ZscSettings, config: &ClientConfig) -> Self {
        let sender = settings.signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(settings.signer))
            .connect_http(settings.rpc_url);
        Self::new(provider, settings.contract, sender, config)
    }

    pub fn from_env(config: &ClientConfig) -> Result<Self, LedgerError> {
        Ok(Self::connect(ZscSettings::from_env()?, config))
    }
}

impl<P: Provider + Clone> ZscLedger<P> {
    pub fn new(provider: P, contract: Address, sender: Address, config: &ClientConfig) -> Self {
        Self {
            contract: IZSC::new(contract, provider.clone()),
            provider,
            address: contract,
            sender,
            confirmation_poll: config.confirmation_poll(),
            confirmation_timeout: config.confirmation_timeout(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    async fn resolve_event(&self, tx_hash: TxHash, block_number: u64) -> Result<TransferEvent, LedgerError> {
        let transaction = self
            .provider
            .get_transaction_by_hash(tx_hash)
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?
            .ok_or_else(|| LedgerError::InvalidResponse(format!("Transaction {tx_hash} not found")))?;

        let decoded = decode_transfer_input(transaction.input())?;
        Ok(TransferEvent {
            tx_hash,
            block_number,
            participants: decoded.participants,
            deltas: decoded.deltas,
            commitment: decoded.commitment,
            beneficiary: decoded.beneficiary,
        })
    }
}

/// Parties and ciphertext adjustments recovered from `zTransfer` calldata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub participants: Vec<PublicKey>,
    pub deltas: Vec<ProjectivePoint>,
    pub commitment: ProjectivePoint,
    pub beneficiary: Option<PublicKey>,
}

/// Decode selector-prefixed `zTransfer` calldata.
pub fn decode_transfer_input(input: &[u8]) -> Result<DecodedTransfer, LedgerError> {
    let call = IZSC::zTransferCall::abi_decode(input)
        .map_err(|e| LedgerError::InvalidResponse(format!("Not a zTransfer call: {e}")))?;
    let invalid = |e: crate::crypto::CryptoError| LedgerError::InvalidResponse(e.to_string());

    let participants = call
        .y
        .iter()
        .map(PublicKey::from_wire)
        .collect::<Result<Vec<_>, _>>()
        .map_err(invalid)?;
    let deltas = call
        .C
        .iter()
        .map(decode_point)
        .collect::<Result<Vec<_>, _>>()
        .map_err(invalid)?;
    if participants.len() != deltas.len() {
        return Err(LedgerError::InvalidResponse(
            "zTransfer party and ciphertext counts differ".to_string(),
        ));
    }
    let commitment = decode_point(&call.D).map_err(invalid)?;
    let beneficiary = optional_key(&call.beneficiary).map_err(invalid)?;

    Ok(DecodedTransfer {
        participants,
        deltas,
        commitment,
        beneficiary,
    })
}

fn optional_key(wire: &WirePoint) -> Result<Option<PublicKey>, crate::crypto::CryptoError> {
    if wire.iter().all(|word| word.is_zero()) {
        return Ok(None);
    }
    PublicKey::from_wire(wire).map(Some)
}

fn to_u64(value: U256, what: &str) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::InvalidResponse(format!("{what} does not fit in 64 bits")))
}

fn contract_error(e: impl std::fmt::Display) -> LedgerError {
    LedgerError::Contract(e.to_string())
}

#[async_trait]
impl<P: Provider + Clone + 'static> Ledger for ZscLedger<P> {
    async fn epoch_length(&self) -> Result<u64, LedgerError> {
        let value = self
            .contract
            .getEpochLength()
            .call()
            .await
            .map_err(contract_error)?;
        to_u64(value, "Epoch length")
    }

    async fn fee(&self) -> Result<u64, LedgerError> {
        let value = self.contract.getFee().call().await.map_err(contract_error)?;
        to_u64(value, "Fee")
    }

    fn contract_address(&self) -> Address {
        self.address
    }

    fn sender_address(&self) -> Address {
        self.sender
    }

    async fn simulate_accounts(
        &self,
        keys: &[PublicKey],
        epoch: Epoch,
    ) -> Result<Vec<Ciphertext>, LedgerError> {
        let wire: Vec<WirePoint> = keys.iter().map(PublicKey::to_wire).collect();
        let accounts = self
            .contract
            .simulateAccounts(wire, U256::from(epoch))
            .call()
            .await
            .map_err(contract_error)?;

        if accounts.len() != keys.len() {
            return Err(LedgerError::InvalidResponse(format!(
                "simulateAccounts returned {} accounts for {} keys",
                accounts.len(),
                keys.len()
            )));
        }
        accounts
            .iter()
            .map(|account| {
                Ciphertext::from_wire(account)
                    .map_err(|e| LedgerError::InvalidResponse(e.to_string()))
            })
            .collect()
    }

    async fn register(
        &self,
        key: &PublicKey,
        signature: &RegistrationSignature,
    ) -> Result<Submitted, LedgerError> {
        let pending = self
            .contract
            .register(
                key.to_wire(),
                scalar_to_word(&signature.challenge),
                scalar_to_word(&signature.response),
            )
            .send()
            .await
            .map_err(contract_error)?;
        Ok(Submitted {
            tx_hash: *pending.tx_hash(),
        })
    }

    async fn deposit(&self, key: &PublicKey, amount: u64) -> Result<Submitted, LedgerError> {
        let pending = self
            .contract
            .zDeposit(key.to_wire(), U256::from(amount))
            .send()
            .await
            .map_err(contract_error)?;
        Ok(Submitted {
            tx_hash: *pending.tx_hash(),
        })
    }

    async fn withdraw(&self, request: WithdrawRequest) -> Result<Submitted, LedgerError> {
        let pending = self
            .contract
            .zWithdraw(
                request.public_key.to_wire(),
                U256::from(request.amount),
                encode_point(&request.nonce_binding),
                Bytes::from(request.proof),
            )
            .send()
            .await
            .map_err(contract_error)?;
        Ok(Submitted {
            tx_hash: *pending.tx_hash(),
        })
    }

    async fn transfer(&self, request: TransferRequest) -> Result<Submitted, LedgerError> {
        let beneficiary = request
            .beneficiary
            .map(|key| key.to_wire())
            .unwrap_or([B256::ZERO, B256::ZERO]);
        let pending = self
            .contract
            .zTransfer(
                request.deltas.iter().map(encode_point).collect(),
                encode_point(&request.commitment),
                request.participants.iter().map(PublicKey::to_wire).collect(),
                encode_point(&request.nonce_binding),
                Bytes::from(request.proof),
                beneficiary,
            )
            .send()
            .await
            .map_err(contract_error)?;
        Ok(Submitted {
            tx_hash: *pending.tx_hash(),
        })
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> Result<TxReceipt, LedgerError> {
        let started = tokio::time::Instant::now();
        loop {
            let receipt = self
                .provider
                .get_transaction_receipt(tx_hash)
                .await
                .map_err(|e| LedgerError::Rpc(format!("Failed to get receipt: {e}")))?;

            if let Some(receipt) = receipt {
                return Ok(TxReceipt {
                    tx_hash,
                    block_number: receipt.block_number.unwrap_or(0),
                    success: receipt.status(),
                });
            }

            if started.elapsed() >= self.confirmation_timeout {
                return Err(LedgerError::Unconfirmed {
                    tx_hash,
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tracing::debug!(tx_hash = %tx_hash, "Awaiting receipt");
            tokio::time::sleep(self.confirmation_poll).await;
        }
    }

    async fn transfer_events(&self, from_block: u64) -> Result<EventBatch, LedgerError> {
        let head = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?;

        let mut events = Vec::new();
        let mut from = from_block;
        while from <= head {
            let to = (from + self.chunk_size - 1).min(head);
            let filter = Filter::new()
                .address(self.address)
                .event_signature(IZSC::TransferOccurred::SIGNATURE_HASH)
                .from_block(from)
                .to_block(to);
            let logs = self
                .provider
                .get_logs(&filter)
                .await
                .map_err(|e| LedgerError::Rpc(e.to_string()))?;

            for log in logs {
                let Some(tx_hash) = log.transaction_hash else {
                    continue;
                };
                let block_number = log.block_number.unwrap_or(to);
                match self.resolve_event(tx_hash, block_number).await {
                    Ok(event) => events.push(event),
                    Err(LedgerError::InvalidResponse(reason)) => {
                        tracing::warn!(tx_hash = %tx_hash, %reason, "Skipping undecodable transfer");
                    }
                    Err(e) => return Err(e),
                }
            }
            from = to + 1;
        }

        Ok(EventBatch {
            events,
            next_block: head.max(from_block.saturating_sub(1)) + 1,
        })
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<u64, LedgerError> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(block_number))
            .await
            .map_err(|e| LedgerError::Rpc(e.to_string()))?
            .ok_or_else(|| LedgerError::InvalidResponse(format!("Block {block_number} not found")))?;
        Ok(block.header.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use rand::rngs::OsRng;
    use std::collections::HashMap;

    fn transfer_calldata(beneficiary: WirePoint) -> (Vec<u8>, Vec<PublicKey>) {
        let keys: Vec<PublicKey> = (0..2).map(|_| KeyPair::generate(&mut OsRng).public()).collect();
        let call = IZSC::zTransferCall {
            C: vec![encode_point(&ProjectivePoint::GENERATOR); 2],
            D: encode_point(&(ProjectivePoint::GENERATOR + ProjectivePoint::GENERATOR)),
            y: keys.iter().map(PublicKey::to_wire).collect(),
            u: encode_point(&ProjectivePoint::GENERATOR),
            proof: Bytes::from(vec![1, 2, 3]),
            beneficiary,
        };
        (call.abi_encode(), keys)
    }

    #[test]
    fn transfer_calldata_yields_parties_and_ciphertexts() {
        let (input, keys) = transfer_calldata([B256::ZERO, B256::ZERO]);
        let decoded = decode_transfer_input(&input).unwrap();

        assert_eq!(decoded.participants, keys);
        assert_eq!(decoded.deltas, vec![ProjectivePoint::GENERATOR; 2]);
        assert_eq!(decoded.commitment, ProjectivePoint::GENERATOR + ProjectivePoint::GENERATOR);
        assert_eq!(decoded.beneficiary, None);
    }

    #[test]
    fn beneficiary_key_is_decoded() {
        let carol = KeyPair::generate(&mut OsRng).public();
        let (input, _) = transfer_calldata(carol.to_wire());
        assert_eq!(decode_transfer_input(&input).unwrap().beneficiary, Some(carol));
    }

    #[test]
    fn other_calls_are_rejected() {
        let deposit = IZSC::zDepositCall {
            y: KeyPair::generate(&mut OsRng).public().to_wire(),
            bTransfer: U256::from(5u64),
        };
        assert!(matches!(
            decode_transfer_input(&deposit.abi_encode()),
            Err(LedgerError::InvalidResponse(_))
        ));
    }

    #[test]
    fn settings_require_every_variable() {
        let vars: HashMap<&str, String> = HashMap::from([
            (RPC_URL_ENV, "http://127.0.0.1:8545".to_string()),
            (CONTRACT_ENV, format!("{}", Address::repeat_byte(0x2a))),
        ]);
        let err = ZscSettings::from_lookup(|name| vars.get(name).cloned()).unwrap_err();
        assert_eq!(
            err,
            LedgerError::Configuration(format!("{SENDER_KEY_ENV} is not set"))
        );

        let mut vars = vars;
        vars.insert(SENDER_KEY_ENV, format!("0x{}", "07".repeat(32)));
        let settings = ZscSettings::from_lookup(|name| vars.get(name).cloned()).unwrap();
        assert_eq!(settings.contract, Address::repeat_byte(0x2a));
        assert_eq!(settings.rpc_url.as_str(), "http://127.0.0.1:8545/");
    }

    #[test]
    fn malformed_contract_address_is_a_configuration_error() {
        let err = ZscSettings::from_lookup(|name| match name {
            RPC_URL_ENV => Some("http://localhost:8545".to_string()),
            CONTRACT_ENV => Some("0xnot-an-address".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(matches!(err, LedgerError::Configuration(msg) if msg.starts_with(CONTRACT_ENV)));
    }

    #[test]
    fn oversized_words_are_invalid_responses() {
        assert_eq!(to_u64(U256::from(12u64), "Epoch length").unwrap(), 12);
        assert!(to_u64(U256::MAX, "Fee").is_err());
    }
}
