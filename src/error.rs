//! 错误类型
//!
//! 控制器与路由各层共用的错误枚举。单个事件处理失败只影响该事件，
//! 配置错误在启动阶段直接返回。

use crate::topo::NodeAddress;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 地址字符串或 dpid 格式不合法
    #[error("malformed address `{input}`: {reason}")]
    Format { input: String, reason: &'static str },

    /// 目标交换机当前没有存活的会话
    #[error("switch {0} has no live session")]
    UnconnectedSwitch(NodeAddress),

    /// src 与 dst 之间没有公共祖先
    #[error("no path from {src} to {dst}")]
    NoPath { src: NodeAddress, dst: NodeAddress },

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("node {0} is not part of the topology")]
    UnknownNode(NodeAddress),

    /// 端口表中不存在该方向的链路
    #[error("could not discover port on link {from} -> {to}")]
    NoPort { from: NodeAddress, to: NodeAddress },

    #[error("malformed packet: {0}")]
    MalformedPacket(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn format(input: impl Into<String>, reason: &'static str) -> Self {
        Error::Format {
            input: input.into(),
            reason,
        }
    }
}
