mod filter;
mod session;
mod store;

use multitxn_core::TxnContext;

pub use filter::*;
pub use session::*;
pub use store::*;

/// Context over a [`DocumentStore`], function tasks receive the [`DocumentSession`].
pub type DocumentContext = TxnContext<DocumentStore>;

/// JSON value of a document list, the shape tasks usually resolve to.
pub fn documents_value(documents: Vec<Document>) -> multitxn_core::Value {
    serde_json::Value::Array(documents.into_iter().map(serde_json::Value::Object).collect()).into()
}
