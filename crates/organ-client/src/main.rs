use organ_client::ClientConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    organ_client::init_tracing();
    organ_client::run(ClientConfig::from_env()).await
}
