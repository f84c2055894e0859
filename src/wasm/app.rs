//! FeedbackApp: the client exposed to JavaScript
//!
//! ```js
//! const app = new FeedbackApp("0x5FbDB2315678afecb367f032d93F642f64180aa3");
//! app.onChange(({ kind, value }) => render(kind, value));
//! await app.connect();
//! app.compose("gm");
//! await app.send();
//! ```

use super::ethereum::Eip1193;
use super::log;
use crate::client::{ClientConfig, FeedbackClient};
use crate::contract::FeedbackContract;
use crate::error::ClientError;
use crate::rpc::EthRpc;
use crate::session::WalletProvider;
use futures::StreamExt;
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;

#[wasm_bindgen]
pub struct FeedbackApp {
    client: Rc<FeedbackClient>,
    running: Cell<bool>,
}

#[wasm_bindgen]
impl FeedbackApp {
    #[wasm_bindgen(constructor)]
    pub fn new(
        contract_address: &str,
        confirmation_timeout_secs: Option<u32>,
    ) -> Result<FeedbackApp, JsValue> {
        let mut config = ClientConfig::new(contract_address);
        if let Some(secs) = confirmation_timeout_secs {
            config = config.with_confirmation_timeout(Duration::from_secs(secs.into()));
        }
        config.validate().map_err(to_js)?;

        let ethereum = Eip1193::detect();
        let present = ethereum.is_present();
        let eth = Rc::new(EthRpc::new(ethereum, &config).map_err(to_js)?);
        let provider = present.then(|| eth.clone() as Rc<dyn WalletProvider>);
        let contract: Rc<dyn FeedbackContract> = eth;
        log!("[FeedbackApp] created (provider present: {})", present);

        let client = Rc::new(FeedbackClient::new(config, provider, contract));
        Ok(Self { client, running: Cell::new(false) })
    }

    #[wasm_bindgen(js_name = "hasProvider")]
    pub fn has_provider(&self) -> bool {
        self.client.session().has_provider()
    }

    /// Already-authorized account, without prompting. `null` when none.
    #[wasm_bindgen(js_name = "checkExisting")]
    pub async fn check_existing(&self) -> Result<JsValue, JsValue> {
        let account = self.client.session().check_existing().await.map_err(to_js)?;
        Ok(account.map(|a| JsValue::from_str(a.as_str())).unwrap_or(JsValue::NULL))
    }

    /// Prompt for access, subscribe and load history. Resolves to the session state.
    ///
    /// Provider notifications are applied from the first call on, even when this one fails
    /// after the wallet connected (e.g. the history read) and the page recovers with `refresh()`.
    #[wasm_bindgen]
    pub async fn connect(&self) -> Result<JsValue, JsValue> {
        self.start_event_loop();
        self.client.connect().await.map_err(to_js)?;
        Ok(to_value(&self.client.session().state()))
    }

    #[wasm_bindgen]
    pub fn disconnect(&self) {
        self.client.session().disconnect();
        self.client.teardown();
    }

    #[wasm_bindgen]
    pub fn compose(&self, draft: &str) -> Result<(), JsValue> {
        self.client.submissions().compose(draft).map_err(to_js)
    }

    /// Resolves to the transaction hash once confirmed.
    #[wasm_bindgen]
    pub async fn send(&self) -> Result<String, JsValue> {
        let tx = self.client.submissions().send().await.map_err(to_js)?;
        Ok(tx.0)
    }

    #[wasm_bindgen]
    pub fn reset(&self) -> Result<(), JsValue> {
        self.client.submissions().reset().map_err(to_js)
    }

    #[wasm_bindgen]
    pub fn retry(&self) -> Result<(), JsValue> {
        self.client.submissions().retry().map_err(to_js)
    }

    /// Re-fetch the whole history.
    #[wasm_bindgen]
    pub async fn refresh(&self) -> Result<u32, JsValue> {
        self.client.store().hydrate().await.map_err(to_js)?;
        Ok(self.client.store().len() as u32)
    }

    /// Whether a history read is outstanding.
    #[wasm_bindgen(js_name = "isLoading")]
    pub fn is_loading(&self) -> bool {
        self.client.store().is_hydrating()
    }

    #[wasm_bindgen]
    pub fn entries(&self) -> JsValue {
        to_value(&*self.client.store().all())
    }

    #[wasm_bindgen]
    pub fn session(&self) -> JsValue {
        to_value(&self.client.session().state())
    }

    #[wasm_bindgen]
    pub fn submission(&self) -> JsValue {
        to_value(&self.client.submissions().state())
    }

    /// Call `callback({kind, value})` on every session, entries or submission change.
    #[wasm_bindgen(js_name = "onChange")]
    pub fn on_change(&self, callback: js_sys::Function) {
        let callback = Rc::new(callback);

        let mut session = self.client.session().watch();
        let cb = callback.clone();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(state) = session.next().await {
                emit(&cb, "session", &state);
            }
        });

        let mut entries = self.client.store().watch();
        let cb = callback.clone();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(snapshot) = entries.next().await {
                emit(&cb, "entries", &*snapshot);
            }
        });

        let mut submission = self.client.submissions().watch();
        wasm_bindgen_futures::spawn_local(async move {
            while let Some(state) = submission.next().await {
                emit(&callback, "submission", &state);
            }
        });
    }
}

impl FeedbackApp {
    fn start_event_loop(&self) {
        if self.running.replace(true) {
            return;
        }
        let client = self.client.clone();
        wasm_bindgen_futures::spawn_local(async move {
            if let Err(e) = client.run().await {
                log!("[FeedbackApp] provider event loop stopped: {}", e);
            }
        });
    }
}

#[derive(Serialize)]
struct Change<'a, T: Serialize> {
    kind: &'a str,
    value: &'a T,
}

fn emit<T: Serialize>(callback: &js_sys::Function, kind: &str, value: &T) {
    let _ = callback.call1(&JsValue::NULL, &to_value(&Change { kind, value }));
}

fn to_value<T: Serialize + ?Sized>(value: &T) -> JsValue {
    let serializer = serde_wasm_bindgen::Serializer::new().serialize_maps_as_objects(true);
    value.serialize(&serializer).unwrap_or(JsValue::NULL)
}

fn to_js(err: ClientError) -> JsValue {
    let error = js_sys::Error::new(&err.to_string());
    let kind = JsValue::from_str(err.kind());
    let _ = js_sys::Reflect::set(&error, &JsValue::from_str("kind"), &kind);
    error.into()
}
