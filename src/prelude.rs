//! Recommended imports grouped by layer.
//!
//! `schema` is enough for code that only reads and writes entities.
//! `api` adds the routing and context surface used to serve them.

pub mod schema {
    //! Entities, transactions and the schema builders.
    pub use crate::schema::{fields, hash, key, range, set};
    pub use crate::{
        Client, ContainerOps, Cx, Entity, HashNode, KeyNode, KvError, Ops, RangeNode, Result,
        Schema, SetNode, StoreConfig,
    };
}

pub mod api {
    //! Route tree, dispatcher and context guards.
    pub use crate::api::{
        ApiConfig, ApiError, ApiNode, Check, Dispatcher, Middleware, Request, Response,
        hash_list, require_context, role_context,
    };
    pub use crate::web::router;
}
