//! WalletSession and FeedbackClient: connection lifecycle and provider notifications
//!
//! These tests verify:
//! 1. Provider absent is reported, not panicked on
//! 2. Listeners are registered once per session lifetime
//! 3. accountsChanged([]) tears everything down and discards the store
//! 4. Account and chain switches rebind the subscription and re-hydrate
//! 5. A newer change supersedes a slower in-flight connect or hydrate
//! 6. A failed re-derive never leaves the previous chain's history or feed behind
//! 7. Notifications are applied even after a connect whose history read failed

mod common;

use common::*;
use feedback_client::core::{Account, ChainId};
use feedback_client::{
    ClientError, FeedbackClient, ProviderEvent, RpcError, SessionChange, SessionState,
    WalletProvider, WalletSession,
};
use std::rc::Rc;

#[test]
fn provider_absent() {
    run_local(async {
        let contract = MockContract::new();
        let client = FeedbackClient::new(config(), None, contract.clone());

        assert!(!client.session().has_provider());
        assert_eq!(client.connect().await, Err(ClientError::ProviderAbsent));
        let existing = client.session().check_existing().await;
        assert_eq!(existing, Err(ClientError::ProviderAbsent));
        assert_eq!(client.session().state(), SessionState::Disconnected);

        client.submissions().compose("hello").unwrap();
        assert_eq!(client.submissions().send().await, Err(ClientError::SessionNotReady));
        assert_eq!(contract.send_count(), 0);
    });
}

#[test]
fn connect_binds_account_and_chain() {
    run_local(async {
        let wallet = MockWallet::new("0xA11CE00000000000000000000000000000000001");
        let contract = MockContract::with_history(vec![raw(BOB, "hello", 100)]);
        let client = client(&wallet, &contract);
        let mut states = client.session().watch();

        let binding = client.connect().await.unwrap();
        assert_eq!(binding.account, Account::new(ALICE));
        assert_eq!(binding.chain_id, ChainId(LOCAL_CHAIN));
        assert_eq!(client.session().current_account(), Some(Account::new(ALICE)));
        assert_eq!(client.session().current_chain(), Some(ChainId(LOCAL_CHAIN)));

        let seen: Vec<&str> = drain(&mut states).iter().map(SessionState::name).collect();
        assert_eq!(seen, ["connecting", "connected"]);

        // Subscribed and hydrated.
        assert!(client.gateway().is_subscribed());
        assert_eq!(client.store().len(), 1);

        client.connect().await.unwrap();
        assert_eq!(wallet.listen_calls.get(), 1);
        assert_eq!(wallet.request_calls.get(), 2);
    });
}

#[test]
fn rejected_connect_is_recoverable() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::new();
        let client = client(&wallet, &contract);

        let rejected = RpcError::Rpc { code: 4001, message: "User rejected the request".into() };
        wallet.fail_next_request(rejected);
        assert_eq!(client.connect().await, Err(ClientError::UserRejected));
        assert_eq!(client.session().state().name(), "error");

        wallet.fail_next_request(RpcError::Transport("extension crashed".into()));
        assert!(matches!(client.connect().await, Err(ClientError::ProviderError(_))));

        client.connect().await.unwrap();
        assert_eq!(client.session().state().name(), "connected");
    });
}

#[test]
fn check_existing_does_not_prompt() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let provider: Rc<dyn WalletProvider> = wallet.clone();
        let session = WalletSession::new(Some(provider));

        assert_eq!(session.check_existing().await.unwrap(), Some(Account::new(ALICE)));
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(wallet.request_calls.get(), 0);

        wallet.set_accounts(&[]);
        assert_eq!(session.check_existing().await.unwrap(), None);
    });
}

#[test]
fn empty_accounts_tears_down() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::with_history(vec![raw(ALICE, "a", 1), raw(BOB, "b", 2)]);
        let client = client(&wallet, &contract);
        client.connect().await.unwrap();
        assert_eq!(client.store().len(), 2);

        let event = ProviderEvent::AccountsChanged(vec![]);
        let change = client.on_provider_event(event).await.unwrap();
        assert_eq!(change, SessionChange::TornDown);
        assert_eq!(client.session().state(), SessionState::Disconnected);
        assert!(client.store().is_empty());
        assert!(!client.gateway().is_subscribed());

        settle().await;
        assert_eq!(contract.open_streams(), 0);
        assert_eq!(contract.emit(raw(BOB, "late", 3)), 0);
        settle().await;
        assert!(client.store().is_empty());

        // Reconnecting hydrates from scratch; nothing from before the teardown comes back.
        contract.set_history(vec![raw(BOB, "b", 2), raw(BOB, "c", 4)]);
        client.connect().await.unwrap();
        let messages: Vec<String> =
            client.store().all().iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, ["b", "c"]);
        assert_eq!(contract.fetch_calls.get(), 2);
        assert_eq!(contract.open_streams(), 1);
    });
}

#[test]
fn account_switch_rebinds() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::with_history(vec![raw(ALICE, "a", 1)]);
        let client = client(&wallet, &contract);
        client.connect().await.unwrap();

        wallet.set_accounts(&[BOB]);
        let event = ProviderEvent::AccountsChanged(vec![Account::new(BOB)]);
        let change = client.on_provider_event(event).await.unwrap();
        match change {
            SessionChange::Rebound { binding, chain_changed } => {
                assert_eq!(binding.account, Account::new(BOB));
                assert!(!chain_changed);
            }
            other => panic!("expected Rebound, got {:?}", other),
        }
        settle().await;

        assert_eq!(contract.fetch_calls.get(), 2);
        assert_eq!(contract.streams_opened.get(), 2);
        assert_eq!(contract.open_streams(), 1);
        assert_eq!(client.store().len(), 1);

        // Writes follow the new account.
        client.submissions().compose("from bob").unwrap();
        client.submissions().send().await.unwrap();
        assert_eq!(contract.sent.borrow()[0].0, Account::new(BOB));
    });
}

#[test]
fn chain_switch_replaces_history() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::with_history(vec![raw(ALICE, "on localhost", 1)]);
        let client = client(&wallet, &contract);
        client.connect().await.unwrap();

        wallet.set_chain(11155111);
        contract.set_history(vec![raw(BOB, "on sepolia", 5)]);
        let mut snapshots = client.store().watch();
        let event = ProviderEvent::ChainChanged(ChainId(11155111));
        let change = client.on_provider_event(event).await.unwrap();

        assert!(matches!(change, SessionChange::Rebound { chain_changed: true, .. }));
        assert_eq!(client.session().current_chain(), Some(ChainId(11155111)));
        let all = client.store().all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "on sepolia");

        // Cleared first, so the old chain's entries never sit next to the new ones.
        let seen: Vec<Vec<String>> = drain(&mut snapshots)
            .iter()
            .map(|s| s.iter().map(|e| e.message.clone()).collect())
            .collect();
        assert_eq!(seen, vec![vec![], vec!["on sepolia".to_string()]]);
    });
}

#[test]
fn newer_change_supersedes_slow_connect() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let provider: Rc<dyn WalletProvider> = wallet.clone();
        let session = Rc::new(WalletSession::new(Some(provider)));
        let release = wallet.gate_chain();

        let connecting = tokio::task::spawn_local({
            let session = session.clone();
            async move { session.connect().await }
        });
        settle().await;
        assert_eq!(session.state(), SessionState::Connecting);

        session.disconnect();
        release.send(()).unwrap();
        assert_eq!(connecting.await.unwrap(), Err(ClientError::Superseded));
        assert_eq!(session.state(), SessionState::Disconnected);
    });
}

#[test]
fn reconnect_invalidates_stale_hydrate() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::new();
        let client = Rc::new(client(&wallet, &contract));
        let alice_reply = contract.defer_fetch();
        let bob_reply = contract.defer_fetch();

        let connecting = tokio::task::spawn_local({
            let client = client.clone();
            async move { client.connect().await }
        });
        settle().await;
        assert_eq!(client.session().state().name(), "connected");

        wallet.set_accounts(&[BOB]);
        let switching = tokio::task::spawn_local({
            let client = client.clone();
            let event = ProviderEvent::AccountsChanged(vec![Account::new(BOB)]);
            async move { client.on_provider_event(event).await }
        });
        settle().await;

        bob_reply.send(Ok(vec![raw(BOB, "bob's view", 2)])).unwrap();
        switching.await.unwrap().unwrap();
        alice_reply.send(Ok(vec![raw(ALICE, "alice's view", 1)])).unwrap();
        connecting.await.unwrap().unwrap();

        let all = client.store().all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].message, "bob's view");
    });
}

#[test]
fn run_loop_applies_provider_notifications() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::with_history(vec![raw(ALICE, "a", 1)]);
        let client = Rc::new(client(&wallet, &contract));
        client.connect().await.unwrap();

        let running = tokio::task::spawn_local({
            let client = client.clone();
            async move { client.run().await }
        });
        settle().await;
        assert!(matches!(client.run().await, Err(ClientError::ProviderError(_))));

        // Live entry, then the wallet disconnects.
        assert_eq!(contract.emit(raw(BOB, "live", 2)), 1);
        settle().await;
        assert_eq!(client.store().len(), 2);

        assert!(wallet.emit(ProviderEvent::AccountsChanged(vec![])));
        settle().await;
        assert_eq!(client.session().state(), SessionState::Disconnected);
        assert!(client.store().is_empty());

        running.abort();
    });
}

#[test]
fn failed_chain_rederive_drops_old_history() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::with_history(vec![raw(ALICE, "on localhost", 1)]);
        let client = client(&wallet, &contract);
        client.connect().await.unwrap();
        assert_eq!(client.store().len(), 1);

        wallet.set_chain(11155111);
        wallet.fail_next_read(RpcError::Transport("wallet locked".into()));
        let event = ProviderEvent::ChainChanged(ChainId(11155111));
        let err = client.on_provider_event(event).await.unwrap_err();
        assert!(matches!(err, ClientError::ProviderError(_)));

        assert_eq!(client.session().state().name(), "error");
        assert!(client.store().is_empty());
        assert!(!client.gateway().is_subscribed());
        settle().await;
        assert_eq!(contract.open_streams(), 0);
        assert_eq!(contract.emit(raw(ALICE, "late localhost entry", 2)), 0);

        // Not locked out: connecting again binds to the new chain.
        contract.set_history(vec![raw(BOB, "on sepolia", 5)]);
        client.connect().await.unwrap();
        assert_eq!(client.session().current_chain(), Some(ChainId(11155111)));
        assert_eq!(client.store().all()[0].message, "on sepolia");
    });
}

#[test]
fn notifications_apply_after_failed_history_read() {
    run_local(async {
        let wallet = MockWallet::new(ALICE);
        let contract = MockContract::with_history(vec![raw(ALICE, "old chain", 1)]);
        let client = Rc::new(client(&wallet, &contract));

        // The event loop runs from before the first connect.
        let running = tokio::task::spawn_local({
            let client = client.clone();
            async move { client.run().await }
        });
        settle().await;

        contract.fail_next_fetch(RpcError::Transport("node restarting".into()));
        assert!(matches!(client.connect().await, Err(ClientError::ReadError(_))));
        assert_eq!(client.session().state().name(), "connected");
        client.store().hydrate().await.unwrap();
        assert_eq!(client.store().all()[0].message, "old chain");

        wallet.set_chain(11155111);
        contract.set_history(vec![raw(BOB, "new chain", 5)]);
        assert!(wallet.emit(ProviderEvent::ChainChanged(ChainId(11155111))));
        settle().await;

        assert_eq!(client.session().current_chain(), Some(ChainId(11155111)));
        let messages: Vec<String> =
            client.store().all().iter().map(|e| e.message.clone()).collect();
        assert_eq!(messages, ["new chain"]);

        running.abort();
    });
}
