use serde::Serialize;

use quotesync_core::{format_price, PriceSource, Ticker};

use super::{controller_config, price_source};
use crate::cli::{FetchArgs, OutputFormat};
use crate::error::CliError;
use crate::output;

#[derive(Debug, Serialize)]
struct FetchedPrice {
    ticker: Ticker,
    price: String,
    source: &'static str,
}

pub async fn run(args: &FetchArgs, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let ticker = Ticker::parse(&args.ticker)?;
    let config = controller_config(&args.provider, None)?;
    let source = price_source(&config);

    let close = source.latest_close(&ticker, &args.api_key).await?;
    let fetched = FetchedPrice {
        price: format_price(close)?,
        ticker,
        source: source.name(),
    };

    match format {
        OutputFormat::Json => output::render_json(&fetched, pretty),
        OutputFormat::Table => {
            println!("{}  {}", fetched.ticker, fetched.price);
            Ok(())
        }
    }
}
