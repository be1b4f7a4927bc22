use std::future::Future;
use std::sync::Arc;
use tracing::{info, warn};

use super::{Ack, Command, CommandError};
use crate::controller::MeterContext;
use crate::domain::{format_energy, DisplayRow};
use crate::store::{keys, StoreError};

/// Executes operator commands against the shared meter context.
#[derive(Clone)]
pub struct CommandDispatcher {
    ctx: Arc<MeterContext>,
}

impl CommandDispatcher {
    pub fn new(ctx: Arc<MeterContext>) -> Self {
        Self { ctx }
    }

    /// Parse and run one command. Rejected commands change nothing.
    pub async fn dispatch(&self, raw: &str) -> Result<Ack, CommandError> {
        let command = match Command::parse(raw) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "command rejected");
                return Err(e);
            }
        };
        let name: &str = command.as_ref();
        info!(code = command.code(), command = name, "command received");
        let result = self.execute(command).await;
        if let Err(e) = &result {
            warn!(error = %e, "command failed");
        }
        result
    }

    pub async fn execute(&self, command: Command) -> Result<Ack, CommandError> {
        if command.is_guarded() && self.ctx.shutdown.is_cancelled() {
            return Err(CommandError::ShuttingDown);
        }
        let code = command.code();
        let settings = &self.ctx.settings;

        match command {
            Command::SetLinkCredentials { ssid, password } => {
                settings.save_link_credentials(&ssid, &password).await?;
                Ok(Ack::done(code))
            }
            Command::UpdateSettings(update) => {
                self.unless_shutdown(self.ctx.update_settings(&update)).await?;
                Ok(Ack::done(code))
            }
            Command::SetNotifyCredentials {
                bot_token,
                recipient_id,
            } => {
                settings
                    .save_notify_credentials(&bot_token, &recipient_id)
                    .await?;
                Ok(Ack::done(code))
            }
            Command::TopUp { amount_kwh } => {
                self.unless_shutdown(self.ctx.top_up(amount_kwh)).await?;
                Ok(Ack::done(code))
            }
            Command::QueryLink => Ok(Ack::reply(
                code,
                vec![
                    settings.text(keys::WIFI_SSID).await?,
                    settings.text(keys::WIFI_PASSWORD).await?,
                ],
            )),
            Command::QuerySettings => {
                let ledger = settings.load_ledger().await?;
                let period = settings.sampling_period().await?;
                Ok(Ack::reply(
                    code,
                    vec![
                        format!("{:.2}", ledger.tariff_rate_per_kwh),
                        format!("{:.2}", ledger.low_balance_threshold_kwh),
                        format!("{:.2}", ledger.daily_limit_kwh),
                        period.as_millis().to_string(),
                    ],
                ))
            }
            Command::QueryNotify => Ok(Ack::reply(
                code,
                vec![
                    settings.text(keys::BOT_TOKEN).await?,
                    settings.text(keys::RECIPIENT_ID).await?,
                ],
            )),
            Command::ResetToZero => {
                self.unless_shutdown(self.ctx.reset_to_zero()).await?;
                Ok(Ack::done(code))
            }
            Command::QueryBalance => {
                let ledger = settings.load_ledger().await?;
                Ok(Ack::reply(
                    code,
                    vec![
                        format_energy(ledger.balance_wh),
                        format_energy(ledger.daily_used_wh),
                    ],
                ))
            }
            Command::ForceRelayOn => {
                self.ctx.relay.lock().force_on();
                self.ctx.show(DisplayRow::Event, "Relay ON");
                Ok(Ack::done(code))
            }
            Command::ForceRelayOff => {
                self.ctx.relay.lock().force_off();
                self.ctx.show(DisplayRow::Event, "Relay OFF");
                Ok(Ack::done(code))
            }
            Command::ReleaseRelay => {
                self.ctx.relay.lock().release();
                info!("relay returned to automatic control");
                Ok(Ack::done(code))
            }
            Command::TestNotification => {
                self.ctx.show(DisplayRow::Event, "Send telegram");
                self.ctx.notifier.send("OK").await?;
                Ok(Ack::done(code))
            }
            Command::Reboot => {
                self.ctx.show(DisplayRow::Event, "Rebooting...");
                self.unless_shutdown(async {
                    self.ctx.begin_shutdown().await;
                    Ok::<_, StoreError>(())
                })
                .await?;
                Ok(Ack::done(code))
            }
        }
    }

    /// A guarded command still waiting for the ledger when shutdown takes it
    /// would wait forever.
    async fn unless_shutdown<T, E>(
        &self,
        op: impl Future<Output = Result<T, E>>,
    ) -> Result<T, CommandError>
    where
        CommandError: From<E>,
    {
        tokio::select! {
            result = op => Ok(result?),
            _ = self.ctx.shutdown.cancelled() => Err(CommandError::ShuttingDown),
        }
    }
}
