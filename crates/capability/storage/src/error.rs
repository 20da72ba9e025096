//! 存储层错误类型
//!
//! 按可恢复性分成两类：
//! - Transient：网络抖动、连接池耗尽、超时，调用方按配置重试
//! - Fatal：模式缺失、约束冲突、解码失败，上层转为停机

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("transient storage error: {0}")]
    Transient(String),
    #[error("fatal storage error: {0}")]
    Fatal(String),
}

impl StorageError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    /// 是否值得重试。
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            // 数据库侧报错（约束、缺表、解码）重试无意义
            sqlx::Error::Database(_)
            | sqlx::Error::RowNotFound
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::TypeNotFound { .. }
            | sqlx::Error::Configuration(_) => Self::Fatal(err.to_string()),
            _ => Self::Transient(err.to_string()),
        }
    }
}
