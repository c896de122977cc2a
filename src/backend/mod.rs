//! 后端层：专家服务抽象与实现（HTTP / Mock）

pub mod http;
pub mod mock;
pub mod traits;

pub use http::HttpBackend;
pub use mock::MockBackend;
pub use traits::{
    ChatRequestBody, ChatResponseBody, DiagnoseRequestBody, DiagnoseResponseBody, ExpertBackend,
};
