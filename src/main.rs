use clap::{Parser, Subcommand};
use dailyblock::application::bootstrap::bootstrap_workspace;
use dailyblock::application::commands::{
    add_goal_impl, add_shift_impl, connect_google_impl, disconnect_google_impl, generate_all_impl, generate_schedule_impl,
    list_goals_impl, list_schedule_impl, list_shifts_impl, preview_free_slots_impl, set_goal_active_impl,
    AppState, NewGoal,
};
use dailyblock::infrastructure::error::InfraError;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dailyblock", version, about = "Plan one day of goal blocks around shifts and calendar events")]
struct Cli {
    /// Directory holding config/, state/ and logs/.
    #[arg(long, env = "DAILYBLOCK_WORKSPACE", default_value = ".")]
    workspace: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the workspace layout, default configs and database.
    Init,
    #[command(subcommand)]
    Goal(GoalCommand),
    #[command(subcommand)]
    Shift(ShiftCommand),
    /// Show the free slots left on a day after shifts and calendar events.
    FreeSlots {
        #[arg(long)]
        user: String,
        /// YYYY-MM-DD; defaults to today in the configured timezone.
        #[arg(long)]
        date: Option<String>,
    },
    /// Generate, store and push the day's blocks for one user.
    Generate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Generate the day for every user with an active goal.
    GenerateAll {
        #[arg(long)]
        date: Option<String>,
    },
    /// Stored blocks for a day.
    Schedule {
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Link a Google account, or report the state of the stored token.
    Connect {
        #[arg(long)]
        user: String,
        #[arg(long)]
        code: Option<String>,
    },
    /// Forget the stored Google token.
    Disconnect {
        #[arg(long)]
        user: String,
    },
}

#[derive(Subcommand)]
enum GoalCommand {
    Add {
        #[arg(long)]
        user: String,
        /// gym, study, work or custom.
        #[arg(long = "type")]
        goal_type: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value_t = 1)]
        weekly_target: u32,
        #[arg(long)]
        daily_hours: Option<f64>,
        /// HH:MM-HH:MM, repeatable.
        #[arg(long = "preferred")]
        preferred_times: Vec<String>,
        #[arg(long, default_value_t = 0)]
        priority: i32,
        #[arg(long)]
        relaxation_minutes: Option<u32>,
    },
    List {
        #[arg(long)]
        user: String,
    },
    Deactivate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        goal: String,
    },
    Activate {
        #[arg(long)]
        user: String,
        #[arg(long)]
        goal: String,
    },
}

#[derive(Subcommand)]
enum ShiftCommand {
    Add {
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: String,
        #[arg(long)]
        start: String,
        #[arg(long)]
        end: String,
    },
    List {
        #[arg(long)]
        user: String,
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Commands::Init = cli.command {
        return match bootstrap_workspace(&cli.workspace) {
            Ok(result) => {
                tracing::info!(database = %result.database_path.display(), "workspace ready");
                print_json(&result)
            }
            Err(error) => fail(&error.to_string()),
        };
    }

    let state = match AppState::new(cli.workspace) {
        Ok(state) => state,
        Err(error) => return fail(&error.to_string()),
    };

    match run(&state, cli.command).await {
        Ok(code) => code,
        Err((command, error)) => fail(&state.command_error(command, &error)),
    }
}

async fn run(state: &AppState, command: Commands) -> Result<ExitCode, (&'static str, InfraError)> {
    let code = match command {
        Commands::Init => ExitCode::SUCCESS,
        Commands::Goal(GoalCommand::Add {
            user,
            goal_type,
            name,
            weekly_target,
            daily_hours,
            preferred_times,
            priority,
            relaxation_minutes,
        }) => {
            let goal = add_goal_impl(
                state,
                NewGoal {
                    user_id: user,
                    goal_type,
                    name,
                    weekly_target,
                    daily_hours,
                    preferred_times,
                    priority,
                    relaxation_minutes,
                },
            )
            .map_err(|error| ("add_goal", error))?;
            print_json(&goal)
        }
        Commands::Goal(GoalCommand::List { user }) => {
            print_json(&list_goals_impl(state, &user).map_err(|error| ("list_goals", error))?)
        }
        Commands::Goal(GoalCommand::Deactivate { user, goal }) => {
            let changed = set_goal_active_impl(state, &user, &goal, false)
                .map_err(|error| ("set_goal_active", error))?;
            print_json(&serde_json::json!({ "goal_id": goal, "changed": changed }))
        }
        Commands::Goal(GoalCommand::Activate { user, goal }) => {
            let changed = set_goal_active_impl(state, &user, &goal, true)
                .map_err(|error| ("set_goal_active", error))?;
            print_json(&serde_json::json!({ "goal_id": goal, "changed": changed }))
        }
        Commands::Shift(ShiftCommand::Add { user, date, start, end }) => {
            let shift = add_shift_impl(state, &user, &date, &start, &end).map_err(|error| ("add_shift", error))?;
            print_json(&shift)
        }
        Commands::Shift(ShiftCommand::List { user, date }) => print_json(
            &list_shifts_impl(state, &user, date.as_deref()).map_err(|error| ("list_shifts", error))?,
        ),
        Commands::FreeSlots { user, date } => print_json(
            &preview_free_slots_impl(state, &user, date.as_deref())
                .await
                .map_err(|error| ("preview_free_slots", error))?,
        ),
        Commands::Generate { user, date } => print_json(
            &generate_schedule_impl(state, &user, date.as_deref())
                .await
                .map_err(|error| ("generate_schedule", error))?,
        ),
        Commands::GenerateAll { date } => {
            let report = generate_all_impl(state, date.as_deref())
                .await
                .map_err(|error| ("generate_all", error))?;
            let failed = !report.failures.is_empty();
            let code = print_json(&report);
            if failed { ExitCode::FAILURE } else { code }
        }
        Commands::Schedule { user, date } => print_json(
            &list_schedule_impl(state, &user, date.as_deref()).map_err(|error| ("list_schedule", error))?,
        ),
        Commands::Connect { user, code } => print_json(
            &connect_google_impl(state, &user, code)
                .await
                .map_err(|error| ("connect_google", error))?,
        ),
        Commands::Disconnect { user } => {
            disconnect_google_impl(state, &user).map_err(|error| ("disconnect_google", error))?;
            print_json(&serde_json::json!({ "user_id": user, "status": "disconnected" }))
        }
    };
    Ok(code)
}

fn print_json<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(error) => fail(&error.to_string()),
    }
}

fn fail(message: &str) -> ExitCode {
    eprintln!("error: {message}");
    ExitCode::FAILURE
}
