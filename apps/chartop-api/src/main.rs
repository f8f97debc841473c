use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = chartop_api::Args::parse();

	chartop_api::run(args).await
}
