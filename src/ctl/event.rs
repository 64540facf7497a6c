//! 控制器入站事件
//!
//! 适配层把线上消息翻译成这三类事件，放入控制器的事件队列。

use std::sync::Arc;

use super::session::SwitchSession;

#[derive(Debug, Clone)]
pub enum ControllerEvent {
    ConnectionUp {
        dpid: u64,
        ports: Vec<u16>,
        session: Arc<dyn SwitchSession>,
    },
    /// `session` 为断开的那条连接；交换机已用新连接重连时该事件被忽略
    ConnectionDown {
        dpid: u64,
        session: Arc<dyn SwitchSession>,
    },
    PacketIn {
        dpid: u64,
        in_port: u16,
        data: Vec<u8>,
    },
}
