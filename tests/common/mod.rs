//! Shared test fixtures: an in-memory wallet provider and feedback contract.
//!
//! Both are scriptable per call and count their network traffic so tests can assert
//! that validation failures never reach them.

#![allow(dead_code)]

use async_trait::async_trait;
use feedback_client::core::{Account, ChainId, TxRef};
use feedback_client::{
    ClientConfig, FeedbackClient, FeedbackContract, ProviderEvent, RawFeedback, Receipt, RpcError,
    WalletProvider,
};
use futures::channel::{mpsc, oneshot};
use futures::stream::LocalBoxStream;
use futures::StreamExt;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::LocalSet;

pub const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const ALICE: &str = "0xa11ce00000000000000000000000000000000001";
pub const BOB: &str = "0xb0b0000000000000000000000000000000000002";
pub const LOCAL_CHAIN: u64 = 31337;

/// Run `fut` on a fresh current-thread runtime inside a `LocalSet`.
pub fn run_local<F: Future>(fut: F) -> F::Output {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    LocalSet::new().block_on(&rt, fut)
}

/// Let spawned local tasks run until they park.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn raw(author: &str, message: &str, seconds: u64) -> RawFeedback {
    RawFeedback { author: Account::new(author), message: message.into(), timestamp: seconds }
}

pub fn config() -> ClientConfig {
    ClientConfig::new(CONTRACT).with_confirmation_timeout(Duration::from_millis(200))
}

pub fn client(wallet: &Rc<MockWallet>, contract: &Rc<MockContract>) -> FeedbackClient {
    let provider: Rc<dyn WalletProvider> = wallet.clone();
    FeedbackClient::new(config(), Some(provider), contract.clone())
}

// =============================================================================
// Wallet provider
// =============================================================================

pub struct MockWallet {
    accounts: RefCell<Vec<Account>>,
    chain: Cell<ChainId>,
    request_errors: RefCell<VecDeque<RpcError>>,
    read_errors: RefCell<VecDeque<RpcError>>,
    chain_gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    sink: RefCell<Option<mpsc::UnboundedSender<ProviderEvent>>>,
    pub request_calls: Cell<usize>,
    pub listen_calls: Cell<usize>,
}

impl MockWallet {
    pub fn new(account: &str) -> Rc<Self> {
        Rc::new(Self {
            accounts: RefCell::new(vec![Account::new(account)]),
            chain: Cell::new(ChainId(LOCAL_CHAIN)),
            request_errors: RefCell::new(VecDeque::new()),
            read_errors: RefCell::new(VecDeque::new()),
            chain_gates: RefCell::new(VecDeque::new()),
            sink: RefCell::new(None),
            request_calls: Cell::new(0),
            listen_calls: Cell::new(0),
        })
    }

    pub fn set_accounts(&self, accounts: &[&str]) {
        *self.accounts.borrow_mut() = accounts.iter().map(Account::new).collect();
    }

    pub fn set_chain(&self, chain: u64) {
        self.chain.set(ChainId(chain));
    }

    pub fn fail_next_request(&self, error: RpcError) {
        self.request_errors.borrow_mut().push_back(error);
    }

    /// Fail the next non-prompting read (`get_accounts()` or `chain_id()`).
    pub fn fail_next_read(&self, error: RpcError) {
        self.read_errors.borrow_mut().push_back(error);
    }

    /// Hold the next `chain_id()` call until the returned sender fires.
    pub fn gate_chain(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.chain_gates.borrow_mut().push_back(rx);
        tx
    }

    /// Push a notification through the registered listener.
    pub fn emit(&self, event: ProviderEvent) -> bool {
        match &*self.sink.borrow() {
            Some(sink) => sink.unbounded_send(event).is_ok(),
            None => false,
        }
    }
}

#[async_trait(?Send)]
impl WalletProvider for MockWallet {
    async fn request_accounts(&self) -> Result<Vec<Account>, RpcError> {
        self.request_calls.set(self.request_calls.get() + 1);
        if let Some(error) = self.request_errors.borrow_mut().pop_front() {
            return Err(error);
        }
        Ok(self.accounts.borrow().clone())
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, RpcError> {
        if let Some(error) = self.read_errors.borrow_mut().pop_front() {
            return Err(error);
        }
        Ok(self.accounts.borrow().clone())
    }

    async fn chain_id(&self) -> Result<ChainId, RpcError> {
        let gate = self.chain_gates.borrow_mut().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if let Some(error) = self.read_errors.borrow_mut().pop_front() {
            return Err(error);
        }
        Ok(self.chain.get())
    }

    fn listen(&self, sink: mpsc::UnboundedSender<ProviderEvent>) {
        self.listen_calls.set(self.listen_calls.get() + 1);
        *self.sink.borrow_mut() = Some(sink);
    }
}

// =============================================================================
// Feedback contract
// =============================================================================

pub enum ReceiptScript {
    Success,
    Reverted,
    Fail(RpcError),
    Never,
}

type FetchReply = Result<Vec<RawFeedback>, RpcError>;

pub struct MockContract {
    history: RefCell<Vec<RawFeedback>>,
    fetch_errors: RefCell<VecDeque<RpcError>>,
    deferred: RefCell<VecDeque<oneshot::Receiver<FetchReply>>>,
    send_errors: RefCell<VecDeque<RpcError>>,
    receipt: RefCell<ReceiptScript>,
    live: RefCell<Vec<mpsc::UnboundedSender<RawFeedback>>>,
    pub sent: RefCell<Vec<(Account, String)>>,
    pub fetch_calls: Cell<usize>,
    pub streams_opened: Cell<usize>,
    /// Append to the history and emit the event when a send confirms.
    pub mine_on_confirm: Cell<bool>,
    clock: Cell<u64>,
}

impl MockContract {
    pub fn new() -> Rc<Self> {
        Self::with_history(Vec::new())
    }

    pub fn with_history(history: Vec<RawFeedback>) -> Rc<Self> {
        Rc::new(Self {
            history: RefCell::new(history),
            fetch_errors: RefCell::new(VecDeque::new()),
            deferred: RefCell::new(VecDeque::new()),
            send_errors: RefCell::new(VecDeque::new()),
            receipt: RefCell::new(ReceiptScript::Success),
            live: RefCell::new(Vec::new()),
            sent: RefCell::new(Vec::new()),
            fetch_calls: Cell::new(0),
            streams_opened: Cell::new(0),
            mine_on_confirm: Cell::new(false),
            clock: Cell::new(1_700_000_000),
        })
    }

    pub fn set_history(&self, history: Vec<RawFeedback>) {
        *self.history.borrow_mut() = history;
    }

    pub fn fail_next_fetch(&self, error: RpcError) {
        self.fetch_errors.borrow_mut().push_back(error);
    }

    /// The next `fetch_all()` waits for whatever the returned sender delivers.
    pub fn defer_fetch(&self) -> oneshot::Sender<FetchReply> {
        let (tx, rx) = oneshot::channel();
        self.deferred.borrow_mut().push_back(rx);
        tx
    }

    pub fn fail_next_send(&self, error: RpcError) {
        self.send_errors.borrow_mut().push_back(error);
    }

    pub fn script_receipt(&self, script: ReceiptScript) {
        *self.receipt.borrow_mut() = script;
    }

    /// Deliver an event to every open stream. Returns how many received it.
    pub fn emit(&self, raw: RawFeedback) -> usize {
        let mut live = self.live.borrow_mut();
        live.retain(|tx| !tx.is_closed());
        live.iter().filter(|tx| tx.unbounded_send(raw.clone()).is_ok()).count()
    }

    pub fn open_streams(&self) -> usize {
        self.live.borrow().iter().filter(|tx| !tx.is_closed()).count()
    }

    pub fn send_count(&self) -> usize {
        self.sent.borrow().len()
    }
}

#[async_trait(?Send)]
impl FeedbackContract for MockContract {
    async fn fetch_all(&self) -> Result<Vec<RawFeedback>, RpcError> {
        self.fetch_calls.set(self.fetch_calls.get() + 1);
        let deferred = self.deferred.borrow_mut().pop_front();
        if let Some(reply) = deferred {
            let abandoned = || Err(RpcError::Transport("fetch abandoned".into()));
            return reply.await.unwrap_or_else(|_| abandoned());
        }
        if let Some(error) = self.fetch_errors.borrow_mut().pop_front() {
            return Err(error);
        }
        Ok(self.history.borrow().clone())
    }

    async fn count(&self) -> Result<u64, RpcError> {
        Ok(self.history.borrow().len() as u64)
    }

    async fn send(&self, from: &Account, message: &str) -> Result<TxRef, RpcError> {
        if let Some(error) = self.send_errors.borrow_mut().pop_front() {
            return Err(error);
        }
        self.sent.borrow_mut().push((from.clone(), message.to_string()));
        Ok(TxRef(format!("0x{:064x}", self.sent.borrow().len())))
    }

    async fn receipt(&self, tx: &TxRef) -> Result<Receipt, RpcError> {
        let success = match &*self.receipt.borrow() {
            ReceiptScript::Success => Some(true),
            ReceiptScript::Reverted => Some(false),
            ReceiptScript::Fail(e) => return Err(e.clone()),
            ReceiptScript::Never => None,
        };
        let Some(success) = success else {
            return futures::future::pending().await;
        };
        if success && self.mine_on_confirm.get() {
            let last = self.sent.borrow().last().cloned();
            if let Some((author, message)) = last {
                let ts = self.clock.get() + 1;
                self.clock.set(ts);
                let item = RawFeedback { author, message, timestamp: ts };
                self.history.borrow_mut().push(item.clone());
                self.emit(item);
            }
        }
        Ok(Receipt { tx: tx.clone(), success, block_number: Some(1) })
    }

    fn new_entries(&self) -> LocalBoxStream<'static, RawFeedback> {
        self.streams_opened.set(self.streams_opened.get() + 1);
        let (tx, rx) = mpsc::unbounded();
        self.live.borrow_mut().push(tx);
        rx.boxed_local()
    }
}

/// Everything a watcher has buffered so far.
pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(Some(item)) = rx.try_next() {
        out.push(item);
    }
    out
}
