use pgpipe::{Binding, Client, PortalName, Result, StatementName};
use bytes::BytesMut;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

pub async fn main() -> Result<()> {
    let client = Client::connect_env().await?;

    client.query("CREATE TEMP TABLE pgpipe(id int)").await?;

    let mut handles = vec![];

    for i in 0..14 {
        let client = client.clone();
        let t = tokio::spawn(async move {
            client
                .query_extended(
                    "INSERT INTO pgpipe(id) VALUES($1::int4)",
                    Binding::new().bind(i.to_string()),
                    0,
                )
                .await
        });
        handles.push(t);
    }

    for h in handles {
        h.await.unwrap()?;
    }

    // Prepared statement in a cursor

    let statement = StatementName::new("ids");
    let prepared = client.prepare(statement.clone(), "SELECT id FROM pgpipe", vec![]).await?;
    assert_eq!(prepared.last_batch().unwrap().fields.len(), 1);

    client.query("BEGIN").await?;

    let portal = PortalName::new("ids_cursor");
    let first = client.execute(portal.clone(), statement.clone(), Binding::new(), 10).await?;
    assert!(first.suspended);
    assert_eq!(first.rows().count(), 10);

    let rest = client.resume(portal.clone(), 0).await?;
    assert_eq!(rest.rows().count(), 4);

    client.query("COMMIT").await?;
    client.close(pgpipe::ServerObjectType::Statement, "ids");

    // Copy

    let source: &'static [u8] = b"100\n101\n";
    let copied = client.copy_in("COPY pgpipe(id) FROM STDIN", Box::new(source)).await?;
    assert_eq!(copied.rows_affected(), 2);

    let sink = Arc::new(Mutex::new(BytesMut::new()));
    let copied = client.copy_out("COPY pgpipe TO STDOUT", sink.clone()).await?;
    assert_eq!(copied.rows_affected(), 16);
    tracing::info!("copied out {} bytes", sink.lock().unwrap().len());

    // A timeout only abandons the response

    let err = client
        .query("SELECT pg_sleep(1)")
        .wait(Duration::from_millis(10))
        .await
        .unwrap_err();
    assert!(err.is_timeout());

    let count = client.query("SELECT count(*) FROM pgpipe").await?;
    assert_eq!(count.rows().next().and_then(|row| row.get_str(0)), Some("16"));

    Ok(())
}
