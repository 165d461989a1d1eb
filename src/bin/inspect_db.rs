use sqlx::Row;
use sqlx::sqlite::SqlitePoolOptions;
use std::env;

const RULE: &str =
    "--------------------------------------------------------------------------------";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <search_query> [database_url]", args[0]);
        eprintln!("Search query matches against Sender or Subject.");
        std::process::exit(1);
    }

    let query = &args[1];
    let search_term = format!("%{}%", query);

    let database_url = args.get(2).map(String::as_str).unwrap_or("sqlite://emails.db");
    let pool = SqlitePoolOptions::new()
        .connect(database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;

    let row = sqlx::query(
        "SELECT id, thread_id, sender, recipients, subject, body, observed_at, is_read, labels, has_attachment
         FROM emails
         WHERE sender LIKE ? OR subject LIKE ?
         ORDER BY observed_at DESC
         LIMIT 1",
    )
    .bind(&search_term)
    .bind(&search_term)
    .fetch_optional(&pool)
    .await?;

    let Some(row) = row else {
        println!("No emails found matching '{}'", query);
        return Ok(());
    };

    let id: String = row.get("id");
    let thread_id: String = row.get("thread_id");
    let labels: Option<String> = row.get("labels");
    let body: String = row.get("body");

    println!("Found Email:");
    println!("ID: {}", id);
    println!("Thread: {}", thread_id);
    println!("From: {}", row.get::<String, _>("sender"));
    println!("To: {}", row.get::<String, _>("recipients"));
    println!("Subject: {}", row.get::<String, _>("subject"));
    println!("Observed: {}", row.get::<String, _>("observed_at"));
    println!("Read: {}", row.get::<bool, _>("is_read"));
    println!("Labels: {}", labels.as_deref().unwrap_or("(none)"));
    println!("{}", RULE);
    println!("BODY (Raw Debug):");
    println!("{:?}", body);
    println!("{}", RULE);

    if row.get::<bool, _>("has_attachment") {
        let attachments = sqlx::query(
            "SELECT filename, mime_type, size FROM attachments WHERE email_id = ? ORDER BY filename",
        )
        .bind(&id)
        .fetch_all(&pool)
        .await?;
        println!("ATTACHMENTS:");
        for attachment in &attachments {
            println!(
                "  {} ({}, {} bytes)",
                attachment.get::<String, _>("filename"),
                attachment.get::<String, _>("mime_type"),
                attachment.get::<i64, _>("size")
            );
        }
        println!("{}", RULE);
    }

    let thread = sqlx::query(
        "SELECT id, sender, observed_at FROM emails
         WHERE thread_id = ?
         ORDER BY observed_at DESC, rowid DESC",
    )
    .bind(&thread_id)
    .fetch_all(&pool)
    .await?;
    println!("THREAD ({} emails):", thread.len());
    for entry in &thread {
        println!(
            "  {}  {}  {}",
            entry.get::<String, _>("observed_at"),
            entry.get::<String, _>("id"),
            entry.get::<String, _>("sender")
        );
    }

    pool.close().await;
    Ok(())
}
