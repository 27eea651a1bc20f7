pub mod builder;
pub mod calltree;
pub mod exclusion;
pub mod language;
pub mod render;
pub mod scip_ingest;
pub mod scip_symbol;
pub mod store;
pub mod symbol;
