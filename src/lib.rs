mod resources;

pub use multitxn_core::*;
pub use multitxn_docstore as docstore;
pub use multitxn_kv as kv;
pub use multitxn_sqlite as sqlite;
pub use resources::*;
