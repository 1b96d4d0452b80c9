use storefront_http::{CatalogClient, CatalogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let email = std::env::var("CATALOG_EMAIL")?;
    let password = std::env::var("CATALOG_PASSWORD")?;

    let config = CatalogConfig::from_env()?;
    println!("using {config:?}");
    let catalog = CatalogClient::new(&config);

    catalog.authenticate(&email, &password).await?;

    let product = catalog.get_product(1, None).await?;
    println!("{product:?}");

    let user = catalog.get_user(1, None).await?;
    println!("{user:?}");

    Ok(())
}
