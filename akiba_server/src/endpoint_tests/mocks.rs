use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use akiba_common::Cents;
use akiba_engine::{
    db_types::{CorrelationId, WalletAddress},
    gateway::{GatewayError, PaymentGateway},
    ledger::{LedgerClient, LedgerError, LedgerEventRecord, SignedSubmission},
};

/// A ledger stub that accepts every submission and hands out sequential transaction hashes.
#[derive(Clone, Default)]
pub struct StubLedger {
    counter: Arc<AtomicU32>,
}

impl LedgerClient for StubLedger {
    async fn deposit(&self, _amount: Cents, _signed: &SignedSubmission) -> Result<String, LedgerError> {
        Ok(format!("0xdep{:04x}", self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    async fn withdraw(&self, _amount: Cents, _signed: &SignedSubmission) -> Result<String, LedgerError> {
        Ok(format!("0xwdr{:04x}", self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    async fn create_goal(&self, _name: &str, _target: Cents, _duration_days: u32) -> Result<i64, LedgerError> {
        Ok(i64::from(self.counter.fetch_add(1, Ordering::SeqCst)) + 1000)
    }

    async fn contribute_to_goal(
        &self,
        _goal_id: i64,
        _amount: Cents,
        _signed: &SignedSubmission,
    ) -> Result<String, LedgerError> {
        Ok(format!("0xcon{:04x}", self.counter.fetch_add(1, Ordering::SeqCst)))
    }

    async fn get_balance(&self, _address: &WalletAddress) -> Result<Cents, LedgerError> {
        Ok(Cents::from(0))
    }

    async fn poll_events(&self, _after_block: u64) -> Result<Vec<LedgerEventRecord>, LedgerError> {
        Ok(vec![])
    }
}

/// A gateway stub that accepts every request and assigns provider references.
#[derive(Clone, Default)]
pub struct StubGateway {
    counter: Arc<AtomicU32>,
}

impl PaymentGateway for StubGateway {
    async fn initiate_deposit(
        &self,
        _phone: &str,
        _amount: Cents,
        _reference: &CorrelationId,
    ) -> Result<CorrelationId, GatewayError> {
        Ok(CorrelationId::from(format!("ws_CO_{}", self.counter.fetch_add(1, Ordering::SeqCst))))
    }

    async fn initiate_withdrawal(
        &self,
        _phone: &str,
        _amount: Cents,
        _remark: &str,
    ) -> Result<CorrelationId, GatewayError> {
        Ok(CorrelationId::from(format!("pw_{}", self.counter.fetch_add(1, Ordering::SeqCst))))
    }
}
