#[tokio::main]
async fn main() -> anyhow::Result<()> {
    djvote_api::run().await
}
