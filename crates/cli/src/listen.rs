//! `pushwire listen` — stream pushes and run actions against each one.

use std::sync::Arc;
use std::time::Duration;

use pw_client::{Error, PushApi};
use pw_listener::{
    Action, ActionDispatcher, EchoAction, ExecAction, ExecSimpleAction, PushListener,
    SentRegistry, ThrottleGate,
};
use tokio::task::JoinSet;

use crate::exit_codes;

pub struct ListenOpts {
    pub key: String,
    pub echo: bool,
    pub exec: Vec<Vec<String>>,
    pub exec_simple: Vec<Vec<String>>,
    pub throttle_count: usize,
    pub throttle_seconds: u64,
    pub device: Option<String>,
    pub list_devices: bool,
}

pub async fn run(api: Arc<dyn PushApi>, opts: ListenOpts) -> i32 {
    if opts.list_devices {
        return list_devices(api.as_ref()).await;
    }

    let device_iden = match &opts.device {
        Some(nickname) => match api.find_or_create_device(nickname).await {
            Ok(device) => Some(device.iden),
            Err(e @ Error::InvalidKey(_)) => {
                eprintln!("listen failed: {e}");
                return exit_codes::INVALID_KEY;
            }
            Err(e) => {
                eprintln!("device {nickname:?} not found and not creatable: {e}");
                return exit_codes::DEVICE_UNAVAILABLE;
            }
        },
        None => None,
    };

    let actions = build_actions(&opts);
    let sent = Arc::new(SentRegistry::default());
    let dispatcher = ActionDispatcher::new(actions, api.clone(), sent.clone());

    let mut builder =
        PushListener::builder(api, &opts.key).suppress_sent(sent);
    if let Some(iden) = device_iden {
        builder = builder.device_iden(iden);
    }
    let mut listener = builder.build();

    if let Err(e) = listener.connect().await {
        eprintln!("listen failed: {e}");
        return exit_codes::for_error(&e);
    }
    tracing::info!("listening for pushes");

    let mut gate = ThrottleGate::new(
        opts.throttle_count,
        Duration::from_secs(opts.throttle_seconds),
    );
    let mut inflight = JoinSet::new();

    let code = loop {
        // The next_push future borrows the listener; shutdown work has
        // to happen after the select, not inside its arms.
        let event = tokio::select! {
            next = listener.next_push() => Some(next),
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(next) = event else {
            tracing::info!("interrupted, shutting down");
            listener.close().await;
            break exit_codes::OK;
        };

        match next {
            Ok(Some(push)) => {
                // The gate stalls this loop, never the frame reader
                // inside the listener; order is preserved.
                let admitted = tokio::select! {
                    _ = gate.acquire() => true,
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("interrupted while throttled, shutting down");
                        listener.close().await;
                        false
                    }
                };
                if !admitted {
                    break exit_codes::OK;
                }
                let dispatcher = dispatcher.clone();
                inflight.spawn(async move {
                    dispatcher.dispatch(&push).await;
                });
            }
            Ok(None) => break exit_codes::OK,
            Err(e) => {
                eprintln!("stream ended: {e}");
                break exit_codes::for_error(&e);
            }
        }
    };

    // Let in-flight dispatches finish; launched processes are not killed.
    while inflight.join_next().await.is_some() {}
    code
}

fn build_actions(opts: &ListenOpts) -> Vec<Box<dyn Action>> {
    let mut actions: Vec<Box<dyn Action>> = Vec::new();
    if opts.echo {
        actions.push(Box::new(EchoAction));
    }
    for cmd in &opts.exec {
        if let Some((program, args)) = cmd.split_first() {
            actions.push(Box::new(ExecAction::new(program, args.to_vec())));
        }
    }
    for cmd in &opts.exec_simple {
        if let Some((program, args)) = cmd.split_first() {
            actions.push(Box::new(ExecSimpleAction::new(program, args.to_vec())));
        }
    }
    if actions.is_empty() {
        actions.push(Box::new(EchoAction));
    }
    actions
}

async fn list_devices(api: &dyn PushApi) -> i32 {
    match api.devices().await {
        Ok(devices) => {
            for device in devices {
                println!("{}", device.nickname);
            }
            exit_codes::OK
        }
        Err(e) => {
            eprintln!("could not list devices: {e}");
            exit_codes::for_error(&e)
        }
    }
}
