// PlayGo 播放客户端 - 生产者
//
// 生产者把一个播放地址变成有序的事件流：先是一个初始化分片，然后是任意数量的
// 媒体分片，最后是一个 `Stopped`。生产者没有反压，控制器只能通过流控请求
// 让它暂停或恢复。
//
// # 实现
//
// - `LocalProducer`: 回放本地文件（JSON Lines事件记录或分片MP4）
// - `JsonLinesSource`: 逐行读取事件记录
// - `Fmp4Source`: 把分片MP4按box切分为初始化分片和媒体分片

pub mod fmp4;
pub mod jsonl;
pub mod local;

pub use fmp4::Fmp4Source;
pub use jsonl::JsonLinesSource;
pub use local::LocalProducer;

use async_trait::async_trait;

use crate::errors::ProducerError;
use playgo_common::{ProducerEvent, SessionId};

/// 控制器使用的生产者接口
///
/// 三个方法都只发出请求、立即返回，结果以控制器事件的形式异步送回：
/// 打开结果为 `OpenResolved`，流内容为 `Producer { session, event }`。
pub trait Producer: Send {
    /// 请求打开 `target`，之后该会话的所有事件都带着 `session`
    fn open_stream(&mut self, session: SessionId, target: &str);

    /// 请求关闭；每个被打开过的会话最终都会收到一个 `Stopped`
    fn close_stream(&mut self, session: SessionId);

    /// 流控：暂停或恢复分片推送
    fn set_flow_paused(&mut self, session: SessionId, paused: bool);
}

/// 事件数据源
#[async_trait]
pub trait EventSource: Send {
    /// 获取下一个事件
    ///
    /// # 返回
    ///
    /// - `Ok(Some(event))`: 成功获取事件
    /// - `Ok(None)`: 数据源已结束
    /// - `Err(error)`: 发生错误
    async fn next_event(&mut self) -> Result<Option<ProducerEvent>, ProducerError>;
}
