//! 事件模块
//!
//! - `types.rs`: 上传生命周期事件类型
//! - `bus.rs`: 观察者与广播订阅，观察者可以阻止 add / submit 的默认行为

mod bus;
mod types;

pub use bus::*;
pub use types::*;
