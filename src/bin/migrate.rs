//! Applies the SQL files under `migrations/` in filename order. The service
//! itself runs embedded migrations on startup; this helper exists for running
//! them manually against a database without starting the server.

use tokio_postgres::NoTls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let conn_str = std::env::var("PG_CONN").unwrap_or_else(|_| {
        "host=127.0.0.1 user=postgres password=postgres dbname=review_saas".into()
    });

    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("connection error: {}", e);
        }
    });

    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS _manual_migrations (
                filename TEXT PRIMARY KEY,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )",
        )
        .await?;

    let mut files: Vec<_> = glob::glob("migrations/*.sql")?
        .collect::<Result<Vec<_>, _>>()?;
    files.sort();

    if files.is_empty() {
        eprintln!("No migration files found under migrations/");
        return Ok(());
    }

    for path in files {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let already_applied = client
            .query_opt(
                "SELECT 1 FROM _manual_migrations WHERE filename = $1",
                &[&filename],
            )
            .await?
            .is_some();
        if already_applied {
            println!("Skipping {} (already applied)", filename);
            continue;
        }

        println!("Applying {}...", filename);
        let sql = std::fs::read_to_string(&path)?;
        client.batch_execute(&sql).await?;
        client
            .execute(
                "INSERT INTO _manual_migrations (filename) VALUES ($1)",
                &[&filename],
            )
            .await?;
    }

    println!("Migrations complete.");
    Ok(())
}
