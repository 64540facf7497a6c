//! 反应式控制器模块
//!
//! 事件定义、交换机会话抽象、报文解析以及控制器状态机。

mod controller;
mod event;
mod message;
pub mod packet;
pub mod runner;
mod session;

pub use controller::{Controller, ControllerStats, MacLocation, PacketInOutcome};
pub use event::ControllerEvent;
pub use message::{
    ControlMessage, DEFAULT_PRIORITY, FlowMatch, FlowMod, IDLE_TIMEOUT, MISS_SEND_LEN,
};
pub use packet::PacketHeaders;
pub use session::{ChannelSession, SessionClosed, SwitchSession};
