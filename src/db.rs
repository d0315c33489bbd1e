use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ConnectOptions, Database, DatabaseConnection,
    sqlx::sqlite::{SqliteJournalMode, SqliteSynchronous},
};

use crate::error::AppResult;

pub async fn connect_and_migrate(database_url: &str) -> AppResult<DatabaseConnection> {
    let in_memory = database_url.contains(":memory:");

    let mut opts = ConnectOptions::new(database_url);
    opts.sqlx_logging(false);
    if in_memory {
        // Every pooled connection would otherwise see its own empty database.
        opts.max_connections(1).min_connections(1);
    }
    // Applied by sqlx to each connection the pool opens.
    opts.map_sqlx_sqlite_opts(move |sqlite| {
        let sqlite = sqlite.foreign_keys(true).synchronous(SqliteSynchronous::Normal);
        if in_memory { sqlite } else { sqlite.journal_mode(SqliteJournalMode::Wal) }
    });
    let db = Database::connect(opts).await?;

    Migrator::up(&db, None).await?;
    Ok(db)
}
