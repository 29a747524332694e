//! `matrix-notify`: relay an Icinga notification into a Matrix room.

use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use notify::{
    IcingaNotification, MatrixChannel, Notifier, NotifyChannel, RenderedMessage, ServiceRef, State,
};
use tracing::{debug, info};

use crate::cli::{BotArgs, Verbosity};

/// Icinga fills these from its runtime macros, e.g. `$service.state$`.
#[derive(Debug, Clone, Parser)]
#[command(name = "matrix-notify", version, about = "Send an Icinga notification to Matrix")]
pub struct NotifyArgs {
    #[command(flatten)]
    pub bot: BotArgs,

    /// The room the bot should send its messages in
    #[arg(long)]
    pub room: String,

    /// $icinga.long_date_time$
    #[arg(long)]
    pub longdatetime: String,
    /// $service.name$, empty for host notifications
    #[arg(long, default_value = "")]
    pub servicename: String,
    /// $service.display_name$
    #[arg(long, default_value = "")]
    pub servicedisplayname: String,
    /// $host.name$
    #[arg(long)]
    pub hostname: String,
    /// $host.display_name$
    #[arg(long)]
    pub hostdisplayname: String,
    /// $service.output$
    #[arg(long)]
    pub serviceoutput: String,
    /// $service.state$ or $host.state$
    #[arg(long)]
    pub servicestate: State,
    /// $notification.type$
    #[arg(long)]
    pub notificationtype: String,

    /// $address$
    #[arg(long)]
    pub hostaddress: Option<String>,
    /// $notification.author$
    #[arg(long)]
    pub notificationauthor: Option<String>,
    /// $notification.comment$
    #[arg(long)]
    pub notificationcomment: Option<String>,
    /// $notification.icingaweb2url$
    #[arg(long)]
    pub icinga2weburl: Option<String>,

    #[command(flatten)]
    pub verbosity: Verbosity,
}

impl NotifyArgs {
    pub fn notification(&self) -> IcingaNotification {
        let service = (!self.servicename.is_empty()).then(|| ServiceRef {
            name: self.servicename.clone(),
            display_name: if self.servicedisplayname.is_empty() {
                self.servicename.clone()
            } else {
                self.servicedisplayname.clone()
            },
        });
        IcingaNotification {
            host_name: self.hostname.clone(),
            host_display_name: self.hostdisplayname.clone(),
            service,
            state: self.servicestate,
            date: self.longdatetime.clone(),
            output: self.serviceoutput.clone(),
            address: self.hostaddress.clone(),
            author: self.notificationauthor.clone(),
            comment: self.notificationcomment.clone(),
            web_url: self.icinga2weburl.clone(),
        }
    }
}

/// Render, print and deliver the notification. Fails if any channel fails.
pub async fn run(args: &NotifyArgs) -> anyhow::Result<()> {
    let message = RenderedMessage::from(args.notification());
    println!("{}", message.markdown);
    debug!(kind = %args.notificationtype, state = %args.servicestate, "relaying notification");

    let client = args.bot.login(None).await.context("failed to log in")?;
    let channel: Arc<dyn NotifyChannel> = Arc::new(MatrixChannel::new(client, args.room.clone()));
    let notifier = Notifier::with_channels(vec![channel]);
    if !notifier.has_channels() {
        bail!("no notification channel enabled, is --room empty?");
    }

    let mut failed = Vec::new();
    for (channel, result) in notifier.deliver(&message).await {
        if let Err(e) = result {
            failed.push(format!("{channel}: {e}"));
        }
    }
    if !failed.is_empty() {
        bail!("failed to deliver notification: {}", failed.join("; "));
    }
    info!(room = %args.room, "notification delivered");
    Ok(())
}
