//! `pushwire send` — push a note or link out.

use std::path::PathBuf;
use std::sync::Arc;

use pw_client::{Error, PushApi};

use crate::exit_codes;

pub struct SendOpts {
    pub title: Option<String>,
    pub body: Option<String>,
    pub url: Option<String>,
    pub device: Option<String>,
    pub file: Option<PathBuf>,
    pub quiet: bool,
}

pub async fn run(api: Arc<dyn PushApi>, opts: SendOpts) -> i32 {
    if let Some(path) = &opts.file {
        eprintln!(
            "file uploads are handled by the transfer helper, not this tool: {}",
            path.display()
        );
        return exit_codes::FILE_UNSUPPORTED;
    }

    if opts.title.is_none() && opts.body.is_none() && opts.url.is_none() {
        eprintln!("nothing to send: give at least one of --title, --body, --url");
        return exit_codes::NOTHING_TO_DO;
    }

    // Sending addresses existing devices only; listen is the side that
    // registers new ones.
    let device_iden = match &opts.device {
        Some(nickname) => match api.find_device(nickname).await {
            Ok(Some(device)) => Some(device.iden),
            Ok(None) => {
                eprintln!("no device named {nickname:?} on this account");
                return exit_codes::DEVICE_UNAVAILABLE;
            }
            Err(e) => return report(e),
        },
        None => None,
    };

    let title = opts.title.as_deref().unwrap_or("");
    let body = opts.body.as_deref().unwrap_or("");

    let result = match &opts.url {
        Some(url) => api.push_link(title, body, url, device_iden.as_deref()).await,
        None => api.push_note(title, body, device_iden.as_deref()).await,
    };

    match result {
        Ok(record) => {
            tracing::debug!(iden = %record.iden, "push created");
            if !opts.quiet {
                println!("{}", record.iden);
            }
            exit_codes::OK
        }
        Err(e) => report(e),
    }
}

fn report(e: Error) -> i32 {
    eprintln!("send failed: {e}");
    exit_codes::for_error(&e)
}
