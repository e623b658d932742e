//! Scripted in-memory exchange used by unit tests.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::{LadderError, Result};
use crate::exchange::{ExchangeTransport, Params};

#[derive(Debug, Clone)]
pub enum Reply {
    Ok(Value),
    Err { status: u16, code: i64, msg: String },
}

impl Reply {
    fn into_result(self) -> Result<Value> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Err { status, code, msg } => Err(LadderError::Exchange {
                status,
                code: Some(code),
                message: msg.clone(),
                body: json!({ "code": code, "msg": msg }),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Call {
    pub method: String,
    pub path: String,
    pub params: Params,
    pub signed: bool,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Default)]
struct Script {
    /// Replies consumed in order before falling back to the sticky reply
    queued: HashMap<(String, String), VecDeque<Reply>>,
    sticky: HashMap<(String, String), Reply>,
    calls: Vec<Call>,
}

/// Exchange double: replies are keyed by (method, path) and every call is recorded.
#[derive(Default)]
pub struct ScriptedExchange {
    script: Mutex<Script>,
}

impl ScriptedExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reply used whenever no queued reply is pending.
    pub fn respond(&self, method: &str, path: &str, value: Value) {
        self.script
            .lock()
            .unwrap()
            .sticky
            .insert((method.to_string(), path.to_string()), Reply::Ok(value));
    }

    pub fn fail(&self, method: &str, path: &str, status: u16, code: i64, msg: &str) {
        self.script.lock().unwrap().sticky.insert(
            (method.to_string(), path.to_string()),
            Reply::Err {
                status,
                code,
                msg: msg.to_string(),
            },
        );
    }

    /// Queue a one-shot reply.
    pub fn push(&self, method: &str, path: &str, reply: Reply) {
        self.script
            .lock()
            .unwrap()
            .queued
            .entry((method.to_string(), path.to_string()))
            .or_default()
            .push_back(reply);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, method: &str, path: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method && c.path == path)
            .collect()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls().iter().filter(|c| c.path == path).count()
    }

    fn dispatch(&self, method: &Method, path: &str, params: Params, signed: bool) -> Result<Value> {
        let mut script = self.script.lock().unwrap();
        script.calls.push(Call {
            method: method.as_str().to_string(),
            path: path.to_string(),
            params,
            signed,
        });

        let key = (method.as_str().to_string(), path.to_string());
        let queued = script.queued.get_mut(&key).and_then(VecDeque::pop_front);
        let reply = queued.or_else(|| script.sticky.get(&key).cloned());

        match reply {
            Some(reply) => reply.into_result(),
            None => panic!("no scripted reply for {} {}", method, path),
        }
    }
}

#[async_trait]
impl ExchangeTransport for ScriptedExchange {
    async fn signed_request(&self, method: Method, path: &str, params: Params) -> Result<Value> {
        self.dispatch(&method, path, params, true)
    }

    async fn public_request(&self, path: &str, params: Params) -> Result<Value> {
        self.dispatch(&Method::GET, path, params, false)
    }
}
