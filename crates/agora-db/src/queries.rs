use crate::models::{AccountRow, DocumentRow, FileRow, RecoveryRow, SessionRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

impl Database {
    // -- Documents --

    /// Insert a document. Returns false if `(collection, id)` is already taken.
    pub fn insert_document(
        &self,
        collection: &str,
        id: &str,
        data: &str,
        now: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO documents (collection, id, data, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![collection, id, data, now],
            )?;
            Ok(changed == 1)
        })
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentRow>> {
        self.with_conn(|conn| select_document(conn, collection, id))
    }

    /// All documents of a collection in insertion order.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<DocumentRow>> {
        self.with_conn(|conn| query_documents(conn, collection))
    }

    /// Rewrite a document's attributes in one transaction: `merge` receives
    /// the stored JSON and returns the replacement. Returns the updated row,
    /// or `None` if the document does not exist.
    pub fn update_document<F>(
        &self,
        collection: &str,
        id: &str,
        now: &str,
        merge: F,
    ) -> Result<Option<DocumentRow>>
    where
        F: FnOnce(&str) -> Result<String>,
    {
        self.with_tx(|tx| {
            let Some(current) = select_document(tx, collection, id)? else {
                return Ok(None);
            };
            let data = merge(&current.data)?;
            tx.execute(
                "UPDATE documents SET data = ?3, updated_at = ?4 WHERE collection = ?1 AND id = ?2",
                rusqlite::params![collection, id, data, now],
            )?;
            Ok(Some(DocumentRow {
                data,
                updated_at: now.to_string(),
                ..current
            }))
        })
    }

    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                [collection, id],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Accounts --

    pub fn create_account(&self, id: &str, email: &str, name: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, email, name, password) VALUES (?1, ?2, ?3, ?4)",
                (id, email, name, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "email", email))
    }

    pub fn get_account_by_id(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id", id))
    }

    pub fn update_account_password(&self, id: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE accounts SET password = ?2 WHERE id = ?1", (id, password_hash))?;
            Ok(())
        })
    }

    // -- Sessions --

    pub fn create_session(&self, id: &str, account_id: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, account_id, expires_at) VALUES (?1, ?2, ?3)",
                (id, account_id, expires_at),
            )?;
            Ok(())
        })
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, account_id, expires_at FROM sessions WHERE id = ?1",
                [id],
                |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_session(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM sessions WHERE id = ?1", [id])?;
            Ok(changed == 1)
        })
    }

    // -- Recoveries --

    pub fn insert_recovery(&self, secret: &str, account_id: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO recoveries (secret, account_id, expires_at) VALUES (?1, ?2, ?3)",
                (secret, account_id, expires_at),
            )?;
            Ok(())
        })
    }

    /// Remove and return a recovery secret issued to `account_id`. Secrets are single-use.
    pub fn take_recovery(&self, secret: &str, account_id: &str) -> Result<Option<RecoveryRow>> {
        self.with_tx(|tx| {
            let row = tx
                .query_row(
                    "SELECT secret, account_id, expires_at FROM recoveries
                     WHERE secret = ?1 AND account_id = ?2",
                    [secret, account_id],
                    |row| {
                        Ok(RecoveryRow {
                            secret: row.get(0)?,
                            account_id: row.get(1)?,
                            expires_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;

            if row.is_some() {
                tx.execute("DELETE FROM recoveries WHERE secret = ?1", [secret])?;
            }
            Ok(row)
        })
    }

    // -- Files --

    pub fn insert_file(&self, file: &FileRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, name, mime_type, size, sha256, data, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    file.id,
                    file.name,
                    file.mime_type,
                    file.size,
                    file.sha256,
                    file.data,
                    file.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, name, mime_type, size, sha256, data, created_at FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        mime_type: row.get(2)?,
                        size: row.get(3)?,
                        sha256: row.get(4)?,
                        data: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn delete_file(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
            Ok(changed == 1)
        })
    }
}

fn document_row(row: &Row<'_>) -> rusqlite::Result<DocumentRow> {
    Ok(DocumentRow {
        seq: row.get(0)?,
        collection: row.get(1)?,
        id: row.get(2)?,
        data: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn select_document(conn: &Connection, collection: &str, id: &str) -> Result<Option<DocumentRow>> {
    conn.query_row(
        "SELECT seq, collection, id, data, created_at, updated_at
         FROM documents WHERE collection = ?1 AND id = ?2",
        [collection, id],
        document_row,
    )
    .optional()
}

fn query_documents(conn: &Connection, collection: &str) -> Result<Vec<DocumentRow>> {
    let mut stmt = conn.prepare(
        "SELECT seq, collection, id, data, created_at, updated_at
         FROM documents
         WHERE collection = ?1
         ORDER BY seq ASC",
    )?;

    let rows = stmt
        .query_map([collection], document_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_account(conn: &Connection, column: &str, value: &str) -> Result<Option<AccountRow>> {
    // `column` is only ever one of our own literals
    let sql = format!("SELECT id, email, name, password FROM accounts WHERE {} = ?1", column);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                password: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
