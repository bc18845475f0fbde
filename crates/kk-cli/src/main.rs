use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;

use kk_core::models::{ConfigFile, Configuration};
use kk_core::services::command::SystemCommandRunner;
use kk_core::services::config_loader;
use kk_core::services::orchestrator::Installer;
use kk_core::services::ports::{PortAllocator, MAX_PROBES_PER_SCAN};
use kk_core::services::prompt::{NonInteractive, Prompter};
use kk_core::services::stage::StageEnv;
use kk_core::services::uninstall::{uninstall, UninstallScope};

use kk_cli::cli::{Cli, Commands, InstallArgs, PortsArgs};
use kk_cli::prompt::TerminalPrompter;
use kk_cli::{logging, report};

const EXIT_STAGE_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<ExitCode> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => match config_loader::load(path) {
            Ok(file) => file,
            Err(e) => {
                eprintln!("k8s-keeper: {e}");
                return Ok(ExitCode::from(EXIT_CONFIG));
            }
        },
        None => ConfigFile::default(),
    };

    match cli.command {
        Commands::Install(args) => run_install(args, &file, cli.debug).await,
        Commands::Uninstall(args) => {
            let scope: UninstallScope = args.scope.into();
            let config = args.location.into_configuration(&file, cli.debug);
            let _guard = logging::init(&config.work_dir, config.debug)?;
            uninstall(&config, &SystemCommandRunner::new(), scope).await?;
            println!("k8s-keeper: {scope} uninstall of {} complete", config.cluster_name);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Status(location) => {
            let config = location.into_configuration(&file, cli.debug);
            print!("{}", report::load_status(&config).await);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Ports(args) => run_ports(args).await,
    }
}

async fn run_install(
    args: InstallArgs,
    file: &ConfigFile,
    debug: bool,
) -> color_eyre::Result<ExitCode> {
    let config: Configuration = args.into_configuration(file, debug);
    // reject bad flags before anything touches the work dir
    if let Err(e) = config.validate() {
        eprintln!("k8s-keeper: {e}");
        return Ok(ExitCode::from(EXIT_CONFIG));
    }
    let _guard = logging::init(&config.work_dir, config.debug)?;

    let runner = SystemCommandRunner::new();
    let terminal = TerminalPrompter::new();
    let headless = NonInteractive;
    let prompter: &dyn Prompter = if std::io::stdin().is_terminal() {
        &terminal
    } else {
        &headless
    };
    let ports = PortAllocator::new();
    let env = StageEnv {
        config: &config,
        runner: &runner,
        prompter,
        ports: &ports,
    };

    let report = match Installer::new(env).run().await {
        Ok(report) => report,
        Err(e) if e.is_configuration() => {
            tracing::error!(error = %e, "configuration rejected");
            eprintln!("k8s-keeper: {e}");
            return Ok(ExitCode::from(EXIT_CONFIG));
        }
        Err(e) => return Err(e.into()),
    };

    print!("{}", report.summary());
    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_STAGE_FAILED))
    }
}

async fn run_ports(args: PortsArgs) -> color_eyre::Result<ExitCode> {
    let allocator = PortAllocator::new();
    match args.scan {
        Some((start, end)) => {
            let in_use = allocator.scan_range(start..end.saturating_add(1)).await;
            print!("{}", report::scan(start..=end, &in_use));
            if usize::from(end - start) >= MAX_PROBES_PER_SCAN {
                println!("(only the first {MAX_PROBES_PER_SCAN} ports were probed)");
            }
        }
        None => {
            let suggestion = allocator.suggest_assignment().await;
            print!("{}", report::ports_table(&suggestion));
        }
    }
    Ok(ExitCode::SUCCESS)
}
