//! 控制器线程
//!
//! 控制器独占一个线程，从单一事件队列顺序取事件；会话适配层只持有发送端。

use std::thread::{self, JoinHandle};

use crossbeam::channel::{Sender, unbounded};

use super::controller::Controller;
use super::event::ControllerEvent;

/// 在新线程上运行控制器。
///
/// 丢弃全部发送端后事件循环结束，`join` 取回控制器以便检查状态。
pub fn spawn(mut controller: Controller) -> (Sender<ControllerEvent>, JoinHandle<Controller>) {
    let (tx, rx) = unbounded();
    let handle = thread::spawn(move || {
        controller.run(&rx);
        controller
    });
    (tx, handle)
}
