use clap::Parser;
use tracing_subscriber::EnvFilter;

use get_after_it::auth::{Credentials, SignUpProfile};
use get_after_it::challenge::domain::progress_document_id;
use get_after_it::challenge::{GoalType, GroupId, Viewer};
use get_after_it::clock::parse_iso_date;
use get_after_it::config::{Cli, Command, Config, GoalCommand, GroupCommand};
use get_after_it::error::{AppError, AppResult};
use get_after_it::goals::{self, GoalInput};
use get_after_it::groups;
use get_after_it::live::{FeedView, GroupFeed};
use get_after_it::profiles;
use get_after_it::progress::{self, ProgressInput, SaveOutcome};
use get_after_it::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::debug!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    let state = AppState::open(config, data_dir)?;

    if let Err(e) = run(&state, cli.command).await {
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }
    Ok(())
}

async fn run(state: &AppState, command: Command) -> AppResult<()> {
    state.restore_session().await?;

    match command {
        Command::SignUp(args) => {
            let session = state
                .identity
                .sign_up(SignUpProfile {
                    email: args.email,
                    password: args.password,
                    display_name: args.name,
                    photo_url: args.photo_url,
                })
                .await?;
            profiles::save_profile(state.store.as_ref(), state.clock.as_ref(), &session.user).await?;
            state.remember_session(&session).await?;
            println!("Welcome, {}!", Viewer::from(&session.user).fallback_name());
        }
        Command::SignIn(args) => {
            let session = state
                .identity
                .sign_in(Credentials {
                    email: args.email,
                    password: args.password,
                })
                .await?;
            state.remember_session(&session).await?;
            println!("Signed in as {}.", session.user.email);
        }
        Command::SignOut => {
            state.forget_session().await?;
            println!("Signed out.");
        }
        Command::Whoami => match state.identity.current_session() {
            Some(session) => {
                let name = session.user.display_name.as_deref().unwrap_or("(no name)");
                println!("{} <{}>", name, session.user.email);
                println!("Current group: {}", state.current_group_id().await?);
            }
            None => println!("Not signed in."),
        },
        Command::Group(cmd) => group_command(state, cmd).await?,
        Command::Goal(cmd) => goal_command(state, cmd).await?,
        Command::Log(args) => {
            let session = state.require_session()?;
            let group_id = state.current_group_id().await?;
            let saved = progress::save_progress(
                state.store.as_ref(),
                state.clock.as_ref(),
                &session.user,
                &group_id,
                ProgressInput {
                    date: args.date,
                    quantity: args.quantity,
                    notes: args.notes,
                },
            )
            .await?;
            match saved.outcome {
                SaveOutcome::Created => println!("Progress saved for {}! Great job.", saved.date),
                SaveOutcome::Updated => println!("Progress for {} updated.", saved.date),
            }
        }
        Command::Delete { date } => {
            let session = state.require_session()?;
            let group_id = state.current_group_id().await?;
            let date = match date {
                Some(raw) => parse_iso_date(&raw)
                    .map(|d| d.to_string())
                    .ok_or_else(|| AppError::validation("Dates look like 2024-01-31."))?,
                None => state.clock.today(),
            };
            let id = progress_document_id(&group_id, &session.user.id, &date);
            progress::delete_progress(state.store.as_ref(), &session.user, &id).await?;
            println!("Progress log deleted.");
        }
        Command::Board { page } => {
            let mut feed = open_feed(state).await?;
            let viewer = state.viewer();
            if feed.next_view(viewer.as_ref()).await.is_some() {
                feed.set_page(page.saturating_sub(1));
                if let Some(view) = feed.current_view(viewer.as_ref()) {
                    print_view(&view);
                }
            }
            feed.close();
        }
        Command::Watch => {
            let mut feed = open_feed(state).await?;
            let mut session_changes = state.identity.watch();
            let shutdown = tokio::signal::ctrl_c();
            tokio::pin!(shutdown);

            loop {
                let viewer = state.viewer();
                tokio::select! {
                    view = feed.next_view(viewer.as_ref()) => match view {
                        Some(view) => {
                            println!();
                            print_view(&view);
                        }
                        None => break,
                    },
                    changed = session_changes.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = &mut shutdown => break,
                }
            }
            feed.close();
        }
    }
    Ok(())
}

async fn open_feed(state: &AppState) -> AppResult<GroupFeed> {
    let group_id = state.current_group_id().await?;
    let feed = GroupFeed::open(
        state.store.clone(),
        group_id,
        state.config.history.page_size,
    )
    .await?;
    Ok(feed)
}

async fn group_command(state: &AppState, cmd: GroupCommand) -> AppResult<()> {
    let store = state.store.as_ref();
    let clock = state.clock.as_ref();

    match cmd {
        GroupCommand::Create { name, description } => {
            let session = state.require_session()?;
            let group =
                groups::create_group(store, clock, &session.user, &name, description.as_deref())
                    .await?;
            state.current_group().set(&group.id).await?;
            println!("Created {} ({}). Invite code: {}", group.name, group.id, group.invite_code);
        }
        GroupCommand::Join { code, id } => {
            let session = state.require_session()?;
            let group = match id {
                Some(id) => {
                    let group_id = GroupId::new(id.trim());
                    groups::join_group(store, clock, &session.user, &group_id).await?
                }
                None => {
                    let code = code.unwrap_or_default();
                    groups::join_by_invite_code(store, clock, &session.user, &code).await?
                }
            };
            state.current_group().set(&group.id).await?;
            println!("Joined {}.", group.name);
        }
        GroupCommand::Search { term } => {
            let found = groups::search_groups(store, &term).await?;
            if found.is_empty() {
                println!("No groups match \"{}\".", term.trim());
            }
            for group in found {
                println!("{}  {}", group.id, group.name);
            }
        }
        GroupCommand::List => {
            let session = state.require_session()?;
            let current = state.current_group_id().await?;
            let mine = groups::list_user_groups(store, &session.user.id).await?;
            if mine.is_empty() {
                println!("You are not in any groups yet.");
            }
            for group in mine {
                let marker = if group.id == current { "*" } else { " " };
                println!("{} {}  {}", marker, group.id, group.name);
            }
        }
        GroupCommand::Use { group_id } => {
            let group = groups::load_group(store, &GroupId::new(group_id.trim()))
                .await?
                .ok_or_else(|| AppError::not_found("Group not found."))?;
            state.current_group().set(&group.id).await?;
            println!("Now using {}.", group.name);
        }
        GroupCommand::Show => {
            let group_id = state.current_group_id().await?;
            let group = groups::load_group(store, &group_id)
                .await?
                .ok_or_else(|| AppError::not_found("Group not found."))?;
            println!("{}", group.name);
            if let Some(description) = &group.description {
                println!("{}", description);
            }
            println!("Invite code: {}", group.invite_code);
            for member in groups::load_members(store, &group_id).await? {
                println!("  {} ({})", member.display_name_or_default(), member.role.as_str());
            }
        }
    }
    Ok(())
}

async fn goal_command(state: &AppState, cmd: GoalCommand) -> AppResult<()> {
    let session = state.require_session()?;
    let group_id = state.current_group_id().await?;

    match cmd {
        GoalCommand::Set {
            challenge_type,
            target,
            daily,
            description,
            start,
            end,
        } => {
            let input = GoalInput {
                challenge_type,
                target_value: target,
                goal_type: if daily { GoalType::Daily } else { GoalType::Numeric },
                description,
                start_date: start,
                end_date: end,
            };
            goals::save_goal(
                state.store.as_ref(),
                state.clock.as_ref(),
                &session.user,
                &group_id,
                input,
            )
            .await?;
            println!("Goal updated!");
        }
        GoalCommand::Reset { yes } => {
            if !yes {
                return Err(AppError::validation(
                    "Resetting removes the goal and all logged progress. Pass --yes to continue.",
                ));
            }
            let deleted = goals::reset_challenge(state.store.as_ref(), &session.user, &group_id).await?;
            println!("Challenge reset ({deleted} progress logs removed). Set a new goal to get started again!");
        }
    }
    Ok(())
}

fn print_view(feed: &FeedView) {
    let Some(group) = &feed.group else {
        println!("Group not found.");
        return;
    };
    let view = &feed.view;

    println!("{} (invite code {})", group.name, group.invite_code);
    match &view.goal {
        Some(goal) => {
            println!("Challenge: {} (target {}, {})", goal.challenge_type, goal.target_value, goal.goal_type);
            println!(
                "Group progress: {} ({}%)",
                view.group_total, view.completion_percentage
            );
        }
        None => println!("No goal set yet."),
    }

    let winners = view.winners();
    if !winners.is_empty() {
        let names: Vec<&str> = winners.iter().map(|r| r.display_name.as_str()).collect();
        println!("Winner: {}", names.join(", "));
    }

    println!("Leaderboard");
    for (index, row) in view.leaderboard.rows.iter().enumerate() {
        let done = row
            .completed_on
            .as_deref()
            .map(|d| format!("  done {d}"))
            .unwrap_or_default();
        println!("  {:>2}. {:<20} {:>8}{}", index + 1, row.display_name, row.total, done);
    }

    if feed.page_count == 0 {
        println!("No progress logged yet.");
        return;
    }
    println!("History (page {} of {})", feed.page + 1, feed.page_count);
    for item in &feed.page_items {
        let notes = item.entry.notes.as_deref().unwrap_or("");
        println!(
            "  {}  {:<20} {:>8}  {}",
            item.entry.date, item.display_name, item.quantity_label, notes
        );
    }
}
