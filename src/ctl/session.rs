//! 交换机会话
//!
//! 控制器只通过 `SwitchSession` 向交换机写消息，不关心底层连接与编解码。
//! 写操作即发即忘，不等待确认。

use std::fmt;

use crossbeam::channel::{Receiver, Sender, unbounded};

use super::message::ControlMessage;

/// 会话已关闭，消息未送出
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("switch session closed")]
pub struct SessionClosed;

pub trait SwitchSession: Send + Sync + fmt::Debug {
    fn send(&self, msg: ControlMessage) -> Result<(), SessionClosed>;
}

/// 基于 crossbeam 通道的会话：适配层持有接收端，按序把消息编码写到连接上。
/// 接收端被丢弃后，`send` 返回 `SessionClosed`。
#[derive(Debug, Clone)]
pub struct ChannelSession {
    tx: Sender<ControlMessage>,
}

impl ChannelSession {
    pub fn pair() -> (Self, Receiver<ControlMessage>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl SwitchSession for ChannelSession {
    fn send(&self, msg: ControlMessage) -> Result<(), SessionClosed> {
        self.tx.send(msg).map_err(|_| SessionClosed)
    }
}
