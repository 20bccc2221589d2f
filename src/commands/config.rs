use anyhow::Result;
use calbridge_core::config::BridgeConfig;

pub fn run(config: &BridgeConfig) -> Result<()> {
    let config_path = BridgeConfig::config_path()?;

    println!("# Config:     {}", config_path.display());
    println!("# Calendars:  {}", config.data_path().display());
    println!();
    print!("{}", config.render()?);

    Ok(())
}
