//! Observer callbacks fired after successful statements.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;

use crate::types::Params;

/// The statement verb a callback is routed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert,
    Update,
    Delete,
    /// Any other verb, lower-cased (`select`, `begin;`, ...).
    Other(String),
}

impl Operation {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Operation::Insert => "insert",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Other(verb) => verb,
        }
    }
}

/// What an observer receives.
#[derive(Debug, Clone)]
pub struct OperationEvent {
    /// Table parsed from the statement; empty when none could be found.
    pub table: String,
    pub operation: Operation,
    /// The statement, lower-cased and trimmed.
    pub sql: String,
    pub params: Params,
    /// Caller-supplied context passed through untouched.
    pub context: Option<JsonValue>,
}

pub type OperationCallback = Arc<dyn Fn(&OperationEvent) + Send + Sync>;

/// Up to four observers, one per operation kind.
#[derive(Clone, Default)]
pub struct CallbackRegistrations {
    pub on_insert: Option<OperationCallback>,
    pub on_update: Option<OperationCallback>,
    pub on_delete: Option<OperationCallback>,
    /// Receives statements that are neither inserts, updates nor deletes.
    pub on_query: Option<OperationCallback>,
}

impl CallbackRegistrations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn on_insert(mut self, cb: impl Fn(&OperationEvent) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_update(mut self, cb: impl Fn(&OperationEvent) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_delete(mut self, cb: impl Fn(&OperationEvent) + Send + Sync + 'static) -> Self {
        self.on_delete = Some(Arc::new(cb));
        self
    }

    #[must_use]
    pub fn on_query(mut self, cb: impl Fn(&OperationEvent) + Send + Sync + 'static) -> Self {
        self.on_query = Some(Arc::new(cb));
        self
    }

    fn callback_for(&self, operation: &Operation) -> Option<&OperationCallback> {
        match operation {
            Operation::Insert => self.on_insert.as_ref(),
            Operation::Update => self.on_update.as_ref(),
            Operation::Delete => self.on_delete.as_ref(),
            Operation::Other(_) => self.on_query.as_ref(),
        }
    }
}

impl fmt::Debug for CallbackRegistrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistrations")
            .field("on_insert", &self.on_insert.is_some())
            .field("on_update", &self.on_update.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_query", &self.on_query.is_some())
            .finish()
    }
}

/// Classify a statement into its operation and target table.
#[must_use]
pub fn classify(sql: &str) -> (Operation, String) {
    let lowered = sql.trim().to_lowercase();
    let words: Vec<&str> = lowered.split_whitespace().collect();
    let Some(verb) = words.first() else {
        return (Operation::Other(String::new()), String::new());
    };

    match *verb {
        "update" => (Operation::Update, table_token(words.get(1))),
        // insert into <table>
        "insert" => (Operation::Insert, table_token(words.get(2))),
        "delete" => (Operation::Delete, table_token(word_after_from(&words))),
        other => (Operation::Other(other.to_string()), table_token(word_after_from(&words))),
    }
}

fn word_after_from<'a>(words: &'a [&'a str]) -> Option<&'a &'a str> {
    words
        .iter()
        .position(|w| *w == "from")
        .and_then(|idx| words.get(idx + 1))
}

fn table_token(word: Option<&&str>) -> String {
    let Some(word) = word else {
        return String::new();
    };
    let word = word.split('(').next().unwrap_or_default();
    word.trim_end_matches(';')
        .trim_matches(|c| c == '`' || c == '"' || c == '[' || c == ']')
        .to_string()
}

/// Route a completed statement to the matching registered observer.
pub fn dispatch(
    registrations: Option<&CallbackRegistrations>,
    sql: &str,
    params: &Params,
    context: Option<&JsonValue>,
) {
    let Some(registrations) = registrations else {
        return;
    };
    let (operation, table) = classify(sql);
    let Some(callback) = registrations.callback_for(&operation) else {
        return;
    };

    let event = OperationEvent {
        table,
        operation,
        sql: sql.trim().to_lowercase(),
        params: params.clone(),
        context: context.cloned(),
    };
    tracing::trace!(table = %event.table, operation = event.operation.as_str(), "dispatching callback");
    callback(&event);
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::types::RowValues;

    #[test]
    fn classifies_mutations() {
        assert_eq!(
            classify("INSERT INTO orders (id) VALUES (?)"),
            (Operation::Insert, "orders".to_string())
        );
        assert_eq!(
            classify("  Update users set a=1"),
            (Operation::Update, "users".to_string())
        );
        assert_eq!(
            classify("DELETE FROM logs WHERE id=1"),
            (Operation::Delete, "logs".to_string())
        );
    }

    #[test]
    fn insert_table_ignores_column_list_glued_to_name() {
        let (_, table) = classify("insert into orders(id) values (1)");
        assert_eq!(table, "orders");
    }

    #[test]
    fn select_is_ignored_without_query_observer() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let regs = CallbackRegistrations::new().on_insert(move |ev| {
            sink.lock().unwrap().push(ev.table.clone());
        });
        dispatch(Some(&regs), "select * from orders", &Params::None, None);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn insert_reaches_insert_observer_with_context() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let regs = CallbackRegistrations::new().on_insert(move |ev| {
            *sink.lock().unwrap() = Some(ev.clone());
        });
        let params = Params::Positional(vec![RowValues::Int(1)]);
        let ctx = serde_json::json!({"user": 9});
        dispatch(
            Some(&regs),
            "INSERT INTO orders (id) VALUES (?)",
            &params,
            Some(&ctx),
        );
        let event = seen.lock().unwrap().clone().unwrap();
        assert_eq!(event.table, "orders");
        assert_eq!(event.operation, Operation::Insert);
        assert_eq!(event.sql, "insert into orders (id) values (?)");
        assert_eq!(event.context, Some(ctx));
    }

    #[test]
    fn no_registrations_is_a_no_op() {
        dispatch(None, "delete from t", &Params::None, None);
    }
}
