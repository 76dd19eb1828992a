#[tokio::main]
async fn main() -> pilvi_dl::Result<()> {
    pilvi_dl::cli::run().await
}
