//! Generate static files

use anyhow::Result;
use std::sync::Arc;

use crate::gateway::ContentGateway;
use crate::generator::Generator;
use crate::Site;

/// Generate the static site from the CMS
pub async fn run(site: &Site, gateway: Arc<dyn ContentGateway>) -> Result<()> {
    let start = std::time::Instant::now();

    let generator = Generator::new(site, gateway)?;
    let written = generator.generate().await?;

    let duration = start.elapsed();
    tracing::info!(
        "Generated {} post pages into {:?} in {:.2}s",
        written,
        site.public_dir,
        duration.as_secs_f64()
    );

    Ok(())
}
