//! Standard node library.
//!
//! Built-in node types registered into a [`NodeExecutor`]. Simple nodes
//! are plain executor closures; stateful ones (the HTTP node with its
//! client) implement [`wireruntime::NodeBehavior`].

mod constant;
mod debug;
mod http;
mod time;
mod transform;

pub use http::HttpRequestNode;

use wireruntime::NodeExecutor;

/// Register every built-in node type
pub async fn register_all(executor: &NodeExecutor) {
    constant::register(executor).await;
    debug::register(executor).await;
    transform::register(executor).await;
    time::register(executor).await;
    http::register(executor).await;
}
