// PlayGo 播放客户端 - 流会话模块
//
// 本模块实现了播放会话的状态机以及它依赖的缓冲组件。
//
// # 核心组件
//
// - `StreamController`: 会话状态机，逐个处理控制器事件
// - `FrameQueue`: 待追加分片的有界FIFO队列，带高/低水位流控
// - `BufferWriter`: 保证同一时刻最多一个追加在途的串行写入器
// - `ReconnectPolicy`: 停止完成后是否自动重新播放的一次性标志
// - `ControllerHandle`: 投递用户操作、订阅UI通知的句柄

pub mod controller;
pub mod events;
pub mod queue;
pub mod reconnect;
pub mod state;
pub mod writer;

pub use controller::{SessionStats, StreamController, StreamSession};
pub use events::{ControllerEvent, ControllerHandle, SinkEvent, UiEvent, UserAction};
pub use queue::{FlowSignal, FrameQueue};
pub use reconnect::ReconnectPolicy;
pub use state::SessionState;
pub use writer::{BufferWriter, DrainOutcome};
