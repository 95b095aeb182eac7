//! Diagnostic CLI: runs a single quote against the configured chain and
//! prints the response as JSON.

use {
    clap::Parser,
    quoter::{Config, Quoter, api},
    std::sync::Arc,
};

#[derive(Debug, clap::Parser)]
struct Cli {
    #[clap(flatten)]
    engine: quoter::Arguments,

    /// Token to sell; accepts "native", "0x0" or an address.
    #[clap(long)]
    token_in: String,

    /// Token to buy.
    #[clap(long)]
    token_out: String,

    /// Exact input amount in base units.
    #[clap(long)]
    amount_in: String,

    /// Allowed slippage in percent.
    #[clap(long)]
    slippage: Option<f64>,
}

/// The diagnostic binary does not encode execution calldata; the service
/// plugs its router encoder in through the same seam.
struct NoCalldata;

impl api::SwapEncoder for NoCalldata {
    fn encode(&self, _: &api::EncodeParams<'_>) -> alloy::primitives::Bytes {
        Default::default()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observe::tracing_init("info,quoter=debug");
    let cli = Cli::parse();
    let config = Config::from_arguments(cli.engine)?;
    tracing::info!(%config, "starting quoter");

    let pool = Arc::new(ethrpc::Pool::new(config.pool_config()));
    pool.initialize().await?;

    let request = api::QuoteRequest {
        token_in: cli.token_in,
        token_out: cli.token_out,
        amount_in: cli.amount_in,
        allowed_slippage: cli.slippage,
        account: None,
    };
    let parsed = request.parse(&config)?;

    let quoter = Quoter::new(config, pool);
    let outcome = quoter.quote(&parsed).await?;
    let response = api::QuoteResponse::build(&parsed, &outcome, &NoCalldata, api::now_unix());
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
