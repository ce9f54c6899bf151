//! `vmshare` shares a host directory into a local VM over 9P and keeps the
//! share alive in the foreground until it is killed or signalled.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;
use vmshare::{
    cli::{VmshareArgs, VmshareSubcommand},
    config::{MountSpec, DEFAULT_MSIZE},
    management::{self, MountOptions, MountOutcome},
    VmshareError,
};

//--------------------------------------------------------------------------------------------------
// Functions: main
//--------------------------------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments; bad usage exits 1, help/version exit 0
    let args = match VmshareArgs::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => {
                    ExitCode::SUCCESS
                }
                _ => ExitCode::FAILURE,
            };
        }
    };

    // Initialize logging; --verbose turns 9P protocol tracing on
    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if args.version {
        println!("vmshare {}", env!("CARGO_PKG_VERSION"));
        return ExitCode::SUCCESS;
    }

    match args.subcommand {
        Some(VmshareSubcommand::Mount {
            spec,
            ip,
            version,
            kill,
            uid,
            gid,
            msize,
            profile,
        }) => {
            // --kill short-circuits before any argument validation
            if kill {
                return kill_subcommand(&profile).await;
            }
            mount_subcommand(spec, ip, version, uid, gid, msize, profile).await
        }
        Some(VmshareSubcommand::Version) => {
            println!("vmshare {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        None => {
            if VmshareArgs::command().print_help().is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: *
//--------------------------------------------------------------------------------------------------

async fn kill_subcommand(profile: &str) -> ExitCode {
    match management::kill_mount(profile).await {
        Ok(()) => {
            tracing::info!("mount daemon for profile {:?} terminated", profile);
            ExitCode::SUCCESS
        }
        // Nothing to kill is a benign no-op
        Err(VmshareError::NoActiveMount(_)) => {
            tracing::info!("no active mount for profile {:?}", profile);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn mount_subcommand(
    spec: Option<String>,
    ip: Option<String>,
    version: String,
    uid: u32,
    gid: u32,
    msize: Option<u32>,
    profile: String,
) -> ExitCode {
    let Some(raw_spec) = spec else {
        tracing::error!("usage: vmshare mount HOST_DIR:VM_DIR");
        return ExitCode::FAILURE;
    };

    let spec = match raw_spec.parse::<MountSpec>() {
        Ok(spec) => spec,
        Err(e) => {
            tracing::error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let options = MountOptions {
        spec,
        ip,
        version,
        uid,
        gid,
        msize: msize.unwrap_or(DEFAULT_MSIZE),
        profile,
    };

    match management::mount_share(options).await {
        Ok(MountOutcome::Completed) => ExitCode::SUCCESS,
        // A driverless profile has nothing to mount into
        Ok(MountOutcome::DriverUnsupported) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
