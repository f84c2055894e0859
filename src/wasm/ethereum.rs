//! EIP-1193 transport over the injected `window.ethereum`

use crate::core::methods::events;
use crate::core::{Account, ChainId};
use crate::error::RpcError;
use crate::rpc::JsonRpc;
use crate::session::ProviderEvent;
use async_trait::async_trait;
use futures::channel::mpsc;
use js_sys::{Function, Reflect};
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;

/// Injected provider handle. `None` inside when the page has no wallet extension.
#[derive(Clone)]
pub struct Eip1193 {
    provider: Option<JsValue>,
}

impl Eip1193 {
    pub fn detect() -> Self {
        let provider = web_sys::window()
            .and_then(|w| Reflect::get(&w, &JsValue::from_str("ethereum")).ok())
            .filter(|p| !p.is_undefined() && !p.is_null());
        Self { provider }
    }

    pub fn is_present(&self) -> bool {
        self.provider.is_some()
    }

    fn method(&self, name: &str) -> Result<(JsValue, Function), RpcError> {
        let provider = self
            .provider
            .clone()
            .ok_or_else(|| RpcError::Transport("no injected provider".into()))?;
        let function = Reflect::get(&provider, &JsValue::from_str(name))
            .ok()
            .and_then(|f| f.dyn_into::<Function>().ok())
            .ok_or_else(|| RpcError::Transport(format!("provider has no {}()", name)))?;
        Ok((provider, function))
    }
}

#[derive(Serialize)]
struct RequestArgs<'a> {
    method: &'a str,
    params: Value,
}

#[async_trait(?Send)]
impl JsonRpc for Eip1193 {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let (provider, request) = self.method("request")?;
        let serializer = serde_wasm_bindgen::Serializer::json_compatible();
        let args = RequestArgs { method, params }
            .serialize(&serializer)
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        let promise = request
            .call1(&provider, &args)
            .map_err(provider_error)?
            .dyn_into::<js_sys::Promise>()
            .map_err(|_| RpcError::Transport("request() did not return a promise".into()))?;
        let result = JsFuture::from(promise).await.map_err(provider_error)?;
        if result.is_undefined() || result.is_null() {
            return Ok(Value::Null);
        }
        serde_wasm_bindgen::from_value(result).map_err(|e| RpcError::Decode(e.to_string()))
    }

    fn listen(&self, sink: mpsc::UnboundedSender<ProviderEvent>) {
        let Ok((provider, on)) = self.method("on") else {
            return;
        };

        let accounts_sink = sink.clone();
        let accounts = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            let list: Vec<String> = serde_wasm_bindgen::from_value(value).unwrap_or_default();
            let current: Vec<Account> = list.iter().map(Account::new).collect();
            let _ = accounts_sink.unbounded_send(ProviderEvent::AccountsChanged(current));
        });
        let chain = Closure::<dyn FnMut(JsValue)>::new(move |value: JsValue| {
            match value.as_string().as_deref().and_then(ChainId::parse) {
                Some(chain) => {
                    let _ = sink.unbounded_send(ProviderEvent::ChainChanged(chain));
                }
                None => super::log!("[feedback] ignoring malformed chainChanged payload"),
            }
        });

        let accounts_event = JsValue::from_str(events::ACCOUNTS_CHANGED);
        let _ = on.call2(&provider, &accounts_event, accounts.as_ref());
        let _ = on.call2(&provider, &JsValue::from_str(events::CHAIN_CHANGED), chain.as_ref());
        // Registered for the page's lifetime.
        accounts.forget();
        chain.forget();
    }
}

fn provider_error(err: JsValue) -> RpcError {
    let code = Reflect::get(&err, &JsValue::from_str("code")).ok().and_then(|c| c.as_f64());
    let message = Reflect::get(&err, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .or_else(|| err.as_string())
        .unwrap_or_else(|| "provider request failed".into());
    match code {
        Some(code) => RpcError::Rpc { code: code as i64, message },
        None => RpcError::Transport(message),
    }
}
