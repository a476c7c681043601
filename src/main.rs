use clap::error::ErrorKind;
use clap::Parser;
use cni_libkv::domain::model::CniError;
use cni_libkv::utils::{logger, validation::Validate};
use cni_libkv::{
    CniArgs, CniCommand, DelegateError, DelegationEngine, DirScratchStore, ExecDelegator,
    StoreRegistry,
};
use std::io::Write;
use tokio::io::AsyncReadExt;

// 0.4.0 and later require CHECK, which this plugin does not implement.
const SUPPORTED_VERSIONS: &[&str] = &["0.1.0", "0.2.0", "0.3.0", "0.3.1"];

#[tokio::main]
async fn main() {
    let args = match CniArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => e.exit(),
        Err(e) => {
            let rendered = e.to_string();
            let message = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ")
                .to_string();
            fail(&DelegateError::InvalidEnvironment { message }, &[]);
        }
    };
    logger::init_cli_logger(args.verbose, args.log_format);

    let mut stdin_data = Vec::new();
    if args.command != CniCommand::Version {
        if let Err(e) = tokio::io::stdin().read_to_end(&mut stdin_data).await {
            fail(&DelegateError::from(e), &stdin_data);
        }
    }

    if let Err(e) = run(&args, &stdin_data).await {
        fail(&e, &stdin_data);
    }
}

async fn run(args: &CniArgs, stdin_data: &[u8]) -> cni_libkv::Result<()> {
    args.validate()?;

    if args.command == CniCommand::Version {
        let version = serde_json::json!({
            "cniVersion": SUPPORTED_VERSIONS[SUPPORTED_VERSIONS.len() - 1],
            "supportedVersions": SUPPORTED_VERSIONS,
        });
        println!("{}", version);
        return Ok(());
    }

    let context = args.container_context()?;
    let engine = DelegationEngine::new(
        StoreRegistry::builtin(),
        DirScratchStore::new(args.state_dir.clone()),
        ExecDelegator::new(),
    );

    match args.command {
        CniCommand::Add => {
            let result = engine.on_attach(&context, stdin_data).await?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(result.as_bytes())?;
            stdout.flush()?;
        }
        CniCommand::Del => engine.on_detach(&context).await?,
        CniCommand::Version => {}
    }
    Ok(())
}

fn fail(err: &DelegateError, stdin_data: &[u8]) -> ! {
    tracing::error!("{} (category: {:?})", err, err.category());

    let cni_version = serde_json::from_slice::<serde_json::Value>(stdin_data)
        .ok()
        .and_then(|v| v.get("cniVersion").and_then(|v| v.as_str()).map(str::to_string));
    let error = CniError::from_error(err, cni_version);
    match serde_json::to_string(&error) {
        Ok(json) => println!("{}", json),
        Err(_) => eprintln!("{}", err),
    }
    std::process::exit(1);
}
