//! 路由模块
//!
//! fat-tree 上的最短多路径发现、路径选择策略与五元组哈希。

mod ecmp;
mod flow_hash;
mod policy;

pub use ecmp::{Path, find_all_paths, find_paths};
pub use flow_hash::{FLOW_KEY_LEN, FlowKey, UNHASHED, flow_hash};
pub use policy::{PathSelector, RoutingPolicy};
