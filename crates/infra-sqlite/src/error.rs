// sqlx::Error -> AppError with SQLite result-code aware messages

use fatura_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            let Some(code) = db_err.code() else {
                return AppError::Database(format!("Database error: {}", db_err.message()));
            };
            let code = code.as_ref();

            // https://www.sqlite.org/rescode.html
            match code {
                "2067" | "1555" => AppError::Conflict(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "787" | "3850" => AppError::Database(format!(
                    "Foreign key constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                "5" => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                "13" => AppError::Database(format!("Database full: {}", db_err.message())),
                _ => AppError::Database(format!(
                    "Database error [{}]: {}",
                    code,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::RowNotFound => AppError::Database("Row not found".to_string()),
        sqlx::Error::ColumnNotFound(col) => {
            AppError::Database(format!("Column not found: {}", col))
        }
        sqlx::Error::ColumnDecode { index, source } => {
            AppError::Database(format!("Cannot decode column {}: {}", index, source))
        }
        // Connection, pool, protocol errors
        _ => AppError::Database(err.to_string()),
    }
}
