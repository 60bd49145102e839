// Panic isolation for job handlers
use std::any::Any;
use tokio::task::JoinError;

/// Why a handler task did not return normally
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerAbort {
    Panicked(String),
    Cancelled,
}

impl std::fmt::Display for HandlerAbort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerAbort::Panicked(msg) => write!(f, "handler panicked: {}", msg),
            HandlerAbort::Cancelled => write!(f, "handler task cancelled"),
        }
    }
}

impl From<JoinError> for HandlerAbort {
    fn from(err: JoinError) -> Self {
        match err.try_into_panic() {
            Ok(payload) => HandlerAbort::Panicked(panic_message(payload.as_ref())),
            Err(_) => HandlerAbort::Cancelled,
        }
    }
}

/// Extract the message from a panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_join_error_carries_panic_message() {
        let handle = tokio::spawn(async {
            panic!("parser exploded");
        });
        let err = handle.await.unwrap_err();
        assert_eq!(
            HandlerAbort::from(err),
            HandlerAbort::Panicked("parser exploded".to_string())
        );
    }

    #[tokio::test]
    async fn test_formatted_panic_message() {
        let handle = tokio::spawn(async {
            let id = 7;
            panic!("invoice {} broke", id);
        });
        let abort = HandlerAbort::from(handle.await.unwrap_err());
        assert_eq!(abort.to_string(), "handler panicked: invoice 7 broke");
    }

    #[tokio::test]
    async fn test_aborted_task_is_cancelled() {
        let handle = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        handle.abort();
        assert_eq!(
            HandlerAbort::from(handle.await.unwrap_err()),
            HandlerAbort::Cancelled
        );
    }
}
