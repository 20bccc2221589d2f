mod commands;
mod local_store;
mod recurrence;

use anyhow::Result;
use calbridge_core::config::BridgeConfig;
use calbridge_core::draft::EventDraft;
use calbridge_core::mutation::EventOverlay;
use calbridge_core::reminder::ReminderRequest;
use calbridge_core::tools::{CreateEventArgs, EventRef, ListEventsArgs, TOOL_NAMES, Toolbox, UpdateEventArgs};
use clap::{Parser, Subcommand};

use crate::local_store::LocalStore;

#[derive(Parser)]
#[command(name = "calbridge")]
#[command(about = "Calendar tools for assistants, backed by a directory of .ics files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List calendars
    Calendars,
    /// List events in a date range (default: last week to next month)
    Events {
        /// Only this calendar
        #[arg(short, long)]
        calendar: Option<String>,

        /// Events from this date/time ("start" for all past events)
        #[arg(long)]
        from: Option<String>,

        /// Events until this date/time
        #[arg(long)]
        to: Option<String>,

        /// Zone for --from/--to without zone information
        #[arg(long)]
        timezone: Option<String>,

        #[arg(long)]
        limit: Option<i64>,
    },
    /// Create an event
    New {
        title: String,

        /// Start date/time (e.g., "2025-03-20T15:00", or "2025-03-20" for all-day)
        #[arg(short, long)]
        start: String,

        #[arg(short, long)]
        end: Option<String>,

        #[arg(short, long)]
        calendar: Option<String>,

        #[arg(long)]
        timezone: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        location: Option<String>,

        /// Recurrence rule, e.g. "FREQ=WEEKLY;BYDAY=MO"
        #[arg(long)]
        rrule: Option<String>,

        /// Reminder this many minutes before the start (repeatable)
        #[arg(long = "alarm")]
        alarms: Vec<i64>,
    },
    /// Change fields of an existing event
    Update {
        /// UID or file path of the event
        event: String,

        #[arg(short, long)]
        calendar: Option<String>,

        #[arg(long)]
        title: Option<String>,

        #[arg(short, long)]
        start: Option<String>,

        #[arg(short, long)]
        end: Option<String>,

        #[arg(long)]
        timezone: Option<String>,

        /// Empty string clears the description
        #[arg(long)]
        description: Option<String>,

        /// Empty string clears the location
        #[arg(long)]
        location: Option<String>,

        /// Empty string removes the recurrence
        #[arg(long)]
        rrule: Option<String>,

        /// Replace reminders with these (minutes before the start, repeatable)
        #[arg(long = "alarm")]
        alarms: Vec<i64>,

        /// Remove all reminders
        #[arg(long, conflicts_with = "alarms")]
        clear_alarms: bool,
    },
    /// Delete an event
    Delete {
        /// UID or file path of the event
        event: String,

        #[arg(short, long)]
        calendar: Option<String>,
    },
    /// List the reminders of an event
    Alarms {
        /// UID or file path of the event
        event: String,

        #[arg(short, long)]
        calendar: Option<String>,
    },
    /// Run a tool by name with JSON arguments
    Call {
        #[arg(value_parser = clap::builder::PossibleValuesParser::new(TOOL_NAMES.iter().copied()))]
        tool: String,

        /// Arguments as a JSON object
        args: Option<String>,
    },
    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays JSON
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::load()?;
    tracing::debug!(calendar_dir = %config.data_path().display(), "configuration loaded");

    let tools = Toolbox::new(LocalStore::new(config.data_path(), config.codec()), &config);

    let reply = match cli.command {
        Commands::Config => return commands::config::run(&config),
        Commands::Calendars => tools.list_calendars().await,
        Commands::Events {
            calendar,
            from,
            to,
            timezone,
            limit,
        } => {
            tools
                .list_events(ListEventsArgs {
                    start: from,
                    end: to,
                    calendar_name: calendar,
                    timezone_name: timezone,
                    limit,
                })
                .await
        }
        Commands::New {
            title,
            start,
            end,
            calendar,
            timezone,
            description,
            location,
            rrule,
            alarms,
        } => {
            let draft = EventDraft {
                summary: title,
                start,
                end,
                description,
                location,
                timezone,
                recurrence_rule: rrule,
                reminders: reminder_requests(alarms),
                alarm_minutes_before: None,
            };
            tools
                .create_event(CreateEventArgs {
                    calendar_name: calendar,
                    draft,
                })
                .await
        }
        Commands::Update {
            event,
            calendar,
            title,
            start,
            end,
            timezone,
            description,
            location,
            rrule,
            alarms,
            clear_alarms,
        } => {
            let reminders = if clear_alarms {
                Some(Vec::new())
            } else {
                reminder_requests(alarms)
            };
            let overlay = EventOverlay {
                summary: title,
                description,
                location,
                start,
                end,
                timezone,
                recurrence_rule: rrule,
                reminders,
                alarm_minutes_before: None,
            };
            tools
                .update_event(UpdateEventArgs {
                    target: event_ref(event, calendar),
                    overlay,
                })
                .await
        }
        Commands::Delete { event, calendar } => tools.delete_event(event_ref(event, calendar)).await,
        Commands::Alarms { event, calendar } => tools.list_event_alarms(event_ref(event, calendar)).await,
        Commands::Call { tool, args } => {
            let args = commands::tool::parse_args(args.as_deref())?;
            tools.call(&tool, args).await
        }
    };

    commands::tool::print_reply(reply)
}

fn reminder_requests(minutes: Vec<i64>) -> Option<Vec<ReminderRequest>> {
    if minutes.is_empty() {
        return None;
    }
    Some(
        minutes
            .into_iter()
            .map(|minutes_before| ReminderRequest {
                minutes_before,
                ..Default::default()
            })
            .collect(),
    )
}

/// Paths are matched by file name, anything else is taken as a UID.
fn event_ref(event: String, calendar: Option<String>) -> EventRef {
    let is_path = event.ends_with(".ics") || event.contains('/');
    if is_path {
        EventRef {
            uid: None,
            event_url: Some(event),
            calendar_name: calendar,
        }
    } else {
        EventRef {
            uid: Some(event),
            event_url: None,
            calendar_name: calendar,
        }
    }
}
