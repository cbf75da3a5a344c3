use crate::cli::ExportConfigArgs;
use crate::drill_yaml;
use crate::exit_codes::ExitCode;
use crate::run::resolve_settings;
use crate::run_error::RunError;

pub async fn export_config(args: ExportConfigArgs) -> Result<ExitCode, RunError> {
    let settings = resolve_settings(&args.drill).await?;
    settings.run.validate().map_err(|e| {
        RunError::InvalidInput(anyhow::Error::new(e).context("invalid drill config"))
    })?;

    let doc = settings.to_yaml();
    match &args.out {
        Some(path) => drill_yaml::write_yaml_file(path, &doc)
            .await
            .map_err(|e| RunError::RuntimeError(e.context("failed to write drill YAML")))?,
        None => {
            let yaml = serde_yaml::to_string(&doc).map_err(|e| {
                RunError::RuntimeError(anyhow::Error::new(e).context("failed to encode drill YAML"))
            })?;
            print!("{yaml}");
        }
    }

    Ok(ExitCode::Success)
}
