use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::json;
use strata_builder::{
    BuildError, BuildReport, Builder, InstallScope, LayerCache, export_environment,
};
use strata_config::{Overrides, StrataConfig};
use strata_launcher::{LaunchConfig, Launcher, Termination};
use strata_types::CachePolicy;

use crate::{Cli, Command, EXIT_LOCK_MISMATCH, InstallArgs};

pub(crate) fn run(cli: Cli) -> Result<ExitCode> {
    let mut overrides = Overrides::from_env();
    if let Command::Serve { app, host, port } = &cli.command {
        if let Some(app) = app {
            overrides.app = Some(app.clone());
        }
        if let Some(host) = host {
            overrides.host = Some(host.clone());
        }
        if let Some(port) = port {
            overrides.port = Some(port.to_string());
        }
    }
    let config = StrataConfig::load(&cli.project, cli.config.as_deref(), &overrides)
        .context("failed to load configuration")?;
    if let Some(source) = &config.source {
        tracing::debug!(path = %source.display(), "Loaded config");
    }

    match cli.command {
        Command::Build(args) | Command::InstallProject(args) => {
            install(&config, args, InstallScope::Project)
        }
        Command::InstallDeps(args) => install(&config, args, InstallScope::Dependencies),
        Command::Verify { json } => verify(&config, json),
        Command::Export { dest } => {
            let report = export_environment(config.build.environment(), &dest)?;
            println!("{}", report.digest);
            Ok(ExitCode::SUCCESS)
        }
        Command::Serve { .. } => serve(config),
        Command::Digest { path } => {
            let digest = strata_utils::tree_digest(&path)
                .with_context(|| format!("failed to hash {}", path.display()))?;
            println!("{digest}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Prune { keep } => prune(&config, keep),
    }
}

fn install(config: &StrataConfig, args: InstallArgs, scope: InstallScope) -> Result<ExitCode> {
    let mut settings = config.build.clone();
    if args.no_cache {
        settings = settings.without_cache();
    }
    let builder = Builder::new(config.paths.clone(), settings);
    let report = builder.install(scope)?;
    print_report(&report, args.json)?;
    Ok(ExitCode::SUCCESS)
}

fn print_report(report: &BuildReport, as_json: bool) -> Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{} packages installed into {} (layer {} {:?})",
        report.packages.len(),
        report.environment.display(),
        report.layer_key.short(),
        report.cache,
    );
    if let Some(project) = &report.project {
        println!("project {} {}", project.name, project.version);
    }
    println!("{}", report.digest);
    Ok(())
}

fn verify(config: &StrataConfig, as_json: bool) -> Result<ExitCode> {
    let builder = Builder::new(config.paths.clone(), config.build.clone());
    match builder.verify() {
        Ok((_, plan)) => {
            if as_json {
                let packages: Vec<_> = plan
                    .packages()
                    .iter()
                    .map(|p| json!({ "name": p.name, "version": p.version }))
                    .collect();
                let out = json!({
                    "ok": true,
                    "project": plan.project(),
                    "layer_key": plan.layer_key(),
                    "packages": packages,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!(
                    "lock ok: {} packages, layer {}",
                    plan.packages().len(),
                    plan.layer_key().short()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(BuildError::LockMismatch(mismatch)) if as_json => {
            let discrepancies: Vec<String> = mismatch
                .discrepancies()
                .iter()
                .map(ToString::to_string)
                .collect();
            let out = json!({
                "ok": false,
                "lock": mismatch.lock_path(),
                "discrepancies": discrepancies,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(ExitCode::from(EXIT_LOCK_MISMATCH))
        }
        Err(err) => Err(err.into()),
    }
}

fn serve(config: StrataConfig) -> Result<ExitCode> {
    let launch = LaunchConfig::new(
        config.launch,
        config.paths.root().to_path_buf(),
        config.build.environment().to_path_buf(),
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let termination = runtime.block_on(async move {
        let mut launcher = Launcher::new(launch);
        launcher.run().await
    })?;

    if let Termination::ServerExited { status } = termination {
        tracing::error!(%status, "Server stopped without a shutdown request");
    }
    Ok(ExitCode::from(u8::try_from(termination.exit_code()).unwrap_or(1)))
}

fn prune(config: &StrataConfig, keep: usize) -> Result<ExitCode> {
    let CachePolicy::Layers(dir) = config.build.cache() else {
        println!("layer cache disabled; nothing to prune");
        return Ok(ExitCode::SUCCESS);
    };
    let removed = LayerCache::new(dir).prune(keep)?;
    println!("removed {} layer(s)", removed.len());
    Ok(ExitCode::SUCCESS)
}
