//! Purpose: JSON report sink and error envelope for `mapstat --json`.
//! Exports: `JsonReport`, `error_json`.
//! Role: Collect report events and emit them as one JSON document.
//! Invariants: `env` appears only when requested; `subdbs` only for `--all`.
//! Invariants: Table names are rendered lossily as UTF-8 strings.

use std::io;

use bstr::BStr;
use mapstat::core::engine::{EnvInfo, Stats};
use mapstat::core::error::Error;
use mapstat::core::report::ReportSink;
use serde_json::{Map, Value, json};

enum Pending {
    Target(Option<String>),
    SubDatabase(String),
}

pub(crate) struct JsonReport {
    env: Option<Value>,
    table: Option<Value>,
    subdbs: Option<Vec<Value>>,
    pending: Option<Pending>,
}

impl JsonReport {
    pub(crate) fn new(walks_sub_databases: bool) -> Self {
        Self {
            env: None,
            table: None,
            subdbs: walks_sub_databases.then(Vec::new),
            pending: None,
        }
    }

    pub(crate) fn into_value(self) -> Value {
        let mut map = Map::new();
        if let Some(env) = self.env {
            map.insert("env".to_string(), env);
        }
        if let Some(table) = self.table {
            map.insert("table".to_string(), table);
        }
        if let Some(subdbs) = self.subdbs {
            map.insert("subdbs".to_string(), Value::Array(subdbs));
        }
        Value::Object(map)
    }
}

fn name_string(name: &[u8]) -> String {
    BStr::new(name).to_string()
}

impl ReportSink for JsonReport {
    fn env_info(&mut self, info: &EnvInfo) -> io::Result<()> {
        self.env = Some(json!(info));
        Ok(())
    }

    fn target(&mut self, name: Option<&[u8]>) -> io::Result<()> {
        self.pending = Some(Pending::Target(name.map(name_string)));
        Ok(())
    }

    fn sub_database(&mut self, name: &[u8]) -> io::Result<()> {
        self.pending = Some(Pending::SubDatabase(name_string(name)));
        Ok(())
    }

    fn stats(&mut self, stats: &Stats) -> io::Result<()> {
        match self.pending.take() {
            Some(Pending::SubDatabase(name)) => {
                let entry = json!({ "name": name, "stats": stats });
                self.subdbs.get_or_insert_with(Vec::new).push(entry);
            }
            Some(Pending::Target(name)) => {
                self.table = Some(json!({ "name": name, "stats": stats }));
            }
            None => {
                self.table = Some(json!({ "name": Value::Null, "stats": stats }));
            }
        }
        Ok(())
    }
}

pub(crate) fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    if let Some(op) = err.op() {
        inner.insert("op".to_string(), json!(op.as_str()));
    }
    if let Some(code) = err.code() {
        inner.insert("code".to_string(), json!(code));
    }
    if let Some(message) = err.message() {
        inner.insert("message".to_string(), json!(message));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}
