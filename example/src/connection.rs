use futures::StreamExt;
use pgpipe::{Binding, Collector, Completion, Connection, PortalName, RequestExecutor, Result};

pub async fn main() -> Result<()> {
    let mut conn = Connection::connect_env().await?;
    let mut notifications = conn.notifications();

    // Pipelined, every request is written before any response is read

    let (create, create_res) = Collector::new(Completion::Ready);
    let (insert, insert_res) = Collector::new(Completion::Ready);
    let (select, select_res) = Collector::new(Completion::Ready);

    conn.query("CREATE TEMP TABLE pgpipe(id serial, name text)", Box::new(create))?;
    conn.query_extended(
        "INSERT INTO pgpipe(name) VALUES($1),($2)",
        &PortalName::unnamed(),
        &Binding::new().bind("Deez").bind("Foo"),
        0,
        Box::new(insert),
    )?;
    conn.query("SELECT name FROM pgpipe ORDER BY id", Box::new(select))?;
    conn.dispatch_all().await?;

    create_res.await?;
    assert_eq!(insert_res.await?.rows_affected(), 2);

    let names = select_res.await?;
    let names: Vec<_> = names.rows().filter_map(|row| row.get_str(0)).collect();
    assert_eq!(names, ["Deez", "Foo"]);

    // Events as they arrive

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    conn.query("SELECT 1; SELECT 2", Box::new(tx))?;
    conn.dispatch_all().await?;
    while let Ok(event) = rx.try_recv() {
        tracing::info!(terminal = event.is_terminal(), "{event:?}");
    }

    // Error case

    let (broken, broken_res) = Collector::new(Completion::Ready);
    conn.query("SELECT foo", Box::new(broken))?;
    conn.dispatch_all().await?;
    broken_res.await.unwrap_err();

    // Notification

    let (listen, listen_res) = Collector::new(Completion::Ready);
    conn.query("LISTEN pgpipe; NOTIFY pgpipe, 'hello'", Box::new(listen))?;
    conn.dispatch_all().await?;
    listen_res.await?;

    let notification = notifications.next().await.unwrap();
    assert_eq!(notification.payload, "hello");

    conn.terminate().await?;
    Ok(())
}
