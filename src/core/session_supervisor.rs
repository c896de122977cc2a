//! 页面生命周期监管：销毁即隐式放弃
//!
//! 持有 CancellationToken；teardown 后所有进行中的诊断 / 追问立即返回 TornDown，其结果不会再写回页面状态。

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct ScreenSupervisor {
    cancel_token: CancellationToken,
}

impl ScreenSupervisor {
    pub fn new() -> Self {
        Self {
            cancel_token: CancellationToken::new(),
        }
    }

    /// 触发销毁（离开页面 / Ctrl+C）
    pub fn teardown(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_torn_down(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// 子 token：每次诊断 / 追问各取一个，页面销毁时一并取消
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }
}

impl Default for ScreenSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_teardown_cancels_children() {
        let supervisor = ScreenSupervisor::new();
        let child = supervisor.child_token();
        assert!(!supervisor.is_torn_down());

        supervisor.teardown();
        assert!(supervisor.is_torn_down());
        assert!(child.is_cancelled());
        // 销毁后新取的子 token 也已取消
        assert!(supervisor.child_token().is_cancelled());
    }

    #[test]
    fn test_cancelling_child_leaves_screen_alive() {
        let supervisor = ScreenSupervisor::new();
        let child = supervisor.child_token();
        child.cancel();
        assert!(!supervisor.is_torn_down());
        assert!(!supervisor.child_token().is_cancelled());
    }
}
