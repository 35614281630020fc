//! Build command - run one firmware build

use crate::cli::args::{BuildArgs, OutputFormat};
use crate::config::Config;
use crate::error::{ForgeError, ForgeResult};
use crate::session::{BuildRequest, BuildResult, Builder};
use crate::ui::{self, TaskSpinner, UiContext};
use tokio::fs;
use tracing::debug;

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> ForgeResult<()> {
    let ctx = UiContext::detect();

    let mut config = config.clone();
    if let Some(registry) = args.registry.clone() {
        config.registry.path = Some(registry);
    }

    let main_source = read_main_source(&args).await?;
    let request = BuildRequest::new(&args.board, args.modules.clone(), main_source, args.caching)?;
    let builder = Builder::from_config(&config).await?;

    let mut spinner = TaskSpinner::new(&ctx);
    if args.format == OutputFormat::Table {
        spinner.start(&format!("Building for {}", request.board()));
    }

    let result = builder.build(&request).await;

    if args.format == OutputFormat::Table {
        if result.success {
            spinner.stop(&format!("Built {}", result.application_name));
        } else {
            spinner.stop_error("Build failed");
        }
    }

    if let Some(ref path) = args.output {
        write_archive(&ctx, &result, path).await?;
    }

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Table => print_result_table(&ctx, &result),
        OutputFormat::Plain => print!("{}", result.cmd_output),
    }

    if result.success {
        Ok(())
    } else {
        Err(ForgeError::BuildFailed(result.board))
    }
}

async fn read_main_source(args: &BuildArgs) -> ForgeResult<String> {
    match (&args.mainfile, &args.mainfile_path) {
        (Some(text), _) => Ok(text.clone()),
        (None, Some(path)) => {
            debug!("Reading main source from {}", path.display());
            fs::read_to_string(path)
                .await
                .map_err(|e| ForgeError::io(format!("reading {}", path.display()), e))
        }
        (None, None) => Ok(String::new()),
    }
}

async fn write_archive(
    ctx: &UiContext,
    result: &BuildResult,
    path: &std::path::Path,
) -> ForgeResult<()> {
    let Some(ref archive) = result.output_archive else {
        ui::step_warn(ctx, "No archive produced, nothing written");
        return Ok(());
    };

    fs::write(path, archive)
        .await
        .map_err(|e| ForgeError::io(format!("writing {}", path.display()), e))?;
    ui::step_ok(ctx, &format!("Archive written to {}", path.display()));
    Ok(())
}

fn print_result_table(ctx: &UiContext, result: &BuildResult) {
    ui::section(ctx, "Build");
    ui::key_value(ctx, "board", &result.board);
    ui::key_value(ctx, "application", &result.application_name);
    ui::key_value(ctx, "success", if result.success { "yes" } else { "no" });

    let archive = match (&result.output_archive, &result.output_archive_extension) {
        (Some(bytes), Some(ext)) => format!("{} bytes ({})", bytes.len(), ext),
        _ => "-".to_string(),
    };
    ui::key_value(ctx, "archive", &archive);

    if !result.cmd_output.is_empty() {
        println!();
        ui::section(ctx, "Output");
        print!("{}", result.cmd_output);
    }
}
