//! 拓扑模块
//!
//! 地址模型、端口推导与 fat-tree 拓扑图。

mod addr;
pub mod fat_tree;
mod port;

pub use addr::{Layer, MacAddr, NodeAddress};
pub use fat_tree::{FatTreeOpts, FatTreeTopology};
pub use port::{HOST_PORT, LinkPorts, is_up_port, link_ports};
