use validator::Validate;

use super::CommandError;
use crate::store::SettingsUpdate;

/// A decoded operator command.
#[derive(Debug, Clone, PartialEq, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Command {
    SetLinkCredentials { ssid: String, password: String },
    UpdateSettings(SettingsUpdate),
    SetNotifyCredentials { bot_token: String, recipient_id: String },
    TopUp { amount_kwh: f64 },
    QueryLink,
    QuerySettings,
    QueryNotify,
    ResetToZero,
    QueryBalance,
    ForceRelayOn,
    ForceRelayOff,
    TestNotification,
    Reboot,
    ReleaseRelay,
}

/// One purchase is at most 100 MWh.
#[derive(Debug, Validate)]
struct TopUpAmount {
    #[validate(range(exclusive_min = 0.0, max = 100_000.0))]
    amount_kwh: f64,
}

impl Command {
    /// Parse `code` or `code,arg1,...`. Trailing NULs and whitespace are
    /// ignored; arguments beyond the required ones are ignored too.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let text = raw.trim_end_matches(|c: char| c == '\0' || c.is_whitespace());
        let mut parts = text.split(',');
        let code_text = parts.next().unwrap_or_default().trim();
        let args: Vec<&str> = parts.collect();
        let code: u8 = code_text
            .parse()
            .map_err(|_| CommandError::UnknownCommand(text.to_string()))?;

        if args.is_empty() {
            return Self::bare(code, text);
        }

        let command = match code {
            1 => {
                let [ssid, password] = required::<2>(code, &args)?;
                Command::SetLinkCredentials {
                    ssid: ssid.to_string(),
                    password: password.to_string(),
                }
            }
            2 => {
                let [tariff, low, daily, period] = required::<4>(code, &args)?;
                let update = SettingsUpdate {
                    tariff_rate_per_kwh: number(tariff, "tariff")?,
                    low_balance_threshold_kwh: number(low, "low balance threshold")?,
                    daily_limit_kwh: number(daily, "daily limit")?,
                    sampling_period_ms: period.trim().parse().map_err(|_| {
                        CommandError::Validation(format!("sampling period `{period}` is not an integer"))
                    })?,
                };
                update.validate()?;
                Command::UpdateSettings(update)
            }
            3 => {
                let [bot_token, recipient_id] = required::<2>(code, &args)?;
                Command::SetNotifyCredentials {
                    bot_token: bot_token.to_string(),
                    recipient_id: recipient_id.to_string(),
                }
            }
            4 => {
                let [amount] = required::<1>(code, &args)?;
                let amount = TopUpAmount {
                    amount_kwh: number(amount, "top-up amount")?,
                };
                amount.validate()?;
                Command::TopUp {
                    amount_kwh: amount.amount_kwh,
                }
            }
            5 | 6 | 11..=15 => {
                return Err(CommandError::Validation(format!(
                    "command {code} takes no arguments"
                )))
            }
            _ => return Err(CommandError::UnknownCommand(text.to_string())),
        };
        Ok(command)
    }

    fn bare(code: u8, text: &str) -> Result<Self, CommandError> {
        Ok(match code {
            1 => Command::QueryLink,
            2 => Command::QuerySettings,
            3 => Command::QueryNotify,
            4 => {
                return Err(CommandError::Validation(
                    "top-up requires an amount in kWh".to_string(),
                ))
            }
            5 => Command::ResetToZero,
            6 => Command::QueryBalance,
            11 => Command::ForceRelayOn,
            12 => Command::ForceRelayOff,
            13 => Command::TestNotification,
            14 => Command::Reboot,
            15 => Command::ReleaseRelay,
            _ => return Err(CommandError::UnknownCommand(text.to_string())),
        })
    }

    pub fn code(&self) -> u8 {
        match self {
            Command::SetLinkCredentials { .. } | Command::QueryLink => 1,
            Command::UpdateSettings(_) | Command::QuerySettings => 2,
            Command::SetNotifyCredentials { .. } | Command::QueryNotify => 3,
            Command::TopUp { .. } => 4,
            Command::ResetToZero => 5,
            Command::QueryBalance => 6,
            Command::ForceRelayOn => 11,
            Command::ForceRelayOff => 12,
            Command::TestNotification => 13,
            Command::Reboot => 14,
            Command::ReleaseRelay => 15,
        }
    }

    /// Commands that take the ledger guard.
    pub fn is_guarded(&self) -> bool {
        matches!(
            self,
            Command::UpdateSettings(_) | Command::TopUp { .. } | Command::ResetToZero | Command::Reboot
        )
    }
}

fn required<'a, const N: usize>(code: u8, args: &[&'a str]) -> Result<[&'a str; N], CommandError> {
    if args.len() < N {
        return Err(CommandError::Validation(format!(
            "command {code} expects {N} argument(s), got {}",
            args.len()
        )));
    }
    let mut out = [""; N];
    out.copy_from_slice(&args[..N]);
    Ok(out)
}

fn number(text: &str, what: &str) -> Result<f64, CommandError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| CommandError::Validation(format!("{what} `{text}` is not a number")))?;
    if !value.is_finite() {
        return Err(CommandError::Validation(format!("{what} must be finite")));
    }
    Ok(value)
}
