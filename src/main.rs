use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use hackboard::auth::{
    AccountService, JsonFileStore, ListQuery, Profile, PublicUser, ResetToken, SessionToken,
    Submission, TokenSigner, VerificationToken,
};
use hackboard::client::{Action, SessionState, StateContainer};
use hackboard::config::{load_signing_secret, ServiceConfig};
use hackboard::email::{
    setup_email_credentials, LogMailer, LogTransport, Mailer, SecureEmailManager, SmtpMailer,
    SmtpRelay,
};
use hackboard::error::{AccountError, AccountResult, ErrorBody};
use hackboard::security::SessionCache;
use hackboard::utils::io::prompt_password;
use hackboard::utils::logging::initialize_logging;
use hackboard::DEFAULT_CONFIG_FILE;

type Service = AccountService<JsonFileStore, Box<dyn Mailer>>;

fn cli() -> Command {
    Command::new("hackboard")
        .version("1.0")
        .about("Hackathon account management")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .help("Path to the JSON config file"),
        )
        .arg(
            Arg::new("data")
                .long("data")
                .global(true)
                .help("Path to the user data file, overriding the config"),
        )
        .subcommand(
            Command::new("register")
                .about("Create an account and sign in")
                .arg(Arg::new("email").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("login")
                .about("Sign in with email and password")
                .arg(Arg::new("email").required(true))
                .arg(password_arg()),
        )
        .subcommand(Command::new("whoami").about("Show the signed-in user"))
        .subcommand(Command::new("logout").about("Sign out and revoke the session"))
        .subcommand(
            Command::new("verify")
                .about("Verify an email address with the emailed code")
                .arg(Arg::new("token").required(true)),
        )
        .subcommand(
            Command::new("resend-verification")
                .about("Send a new verification email")
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("forgot-password")
                .about("Request a password reset email")
                .arg(Arg::new("email").required(true)),
        )
        .subcommand(
            Command::new("reset-password")
                .about("Set a new password with an emailed reset code")
                .arg(Arg::new("token").required(true))
                .arg(password_arg()),
        )
        .subcommand(
            Command::new("profile")
                .about("Update the signed-in user's profile")
                .arg(Arg::new("name").long("name").required(true))
                .arg(Arg::new("team").long("team"))
                .arg(Arg::new("affiliation").long("affiliation"))
                .arg(Arg::new("github").long("github")),
        )
        .subcommand(
            Command::new("submit")
                .about("Set the signed-in user's project submission")
                .arg(Arg::new("code").long("code").required(true))
                .arg(Arg::new("title").long("title").required(true)),
        )
        .subcommand(
            Command::new("list")
                .about("List users by name")
                .arg(
                    Arg::new("page")
                        .long("page")
                        .value_parser(value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    Arg::new("size")
                        .long("size")
                        .value_parser(value_parser!(usize))
                        .default_value("20"),
                )
                .arg(Arg::new("search").long("search")),
        )
        .subcommand(
            Command::new("user")
                .about("Show one user by id")
                .arg(Arg::new("id").required(true)),
        )
        .subcommand(
            Command::new("setup-email")
                .about("Store SMTP credentials in the keyring")
                .arg(
                    Arg::new("remove")
                        .long("remove")
                        .action(ArgAction::SetTrue)
                        .help("Delete the stored credentials instead"),
                ),
        )
        .subcommand_required(true)
}

fn password_arg() -> Arg {
    Arg::new("password")
        .long("password")
        .help("Read from a hidden prompt when omitted")
}

fn text<'a>(matches: &'a ArgMatches, name: &str) -> &'a str {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .unwrap_or_default()
}

fn password(matches: &ArgMatches) -> AccountResult<String> {
    match matches.get_one::<String>("password") {
        Some(password) => Ok(password.clone()),
        None => Ok(prompt_password("Password")?),
    }
}

fn to_json<T: Serialize>(value: &T) -> AccountResult<Value> {
    Ok(serde_json::to_value(value)?)
}

fn message(text: impl Into<String>) -> Value {
    json!({ "message": text.into() })
}

fn build_mailer(config: &ServiceConfig) -> Box<dyn Mailer> {
    let context = config.mail_context();
    if config.mail_enabled {
        let credentials = SecureEmailManager::new().and_then(|manager| manager.get_credentials());
        match credentials {
            Ok(Some(credentials)) => {
                let relay = SmtpRelay::new(credentials, &config.mail_from_name).and_then(|relay| {
                    match &config.mail_from_address {
                        Some(address) => relay.with_from_address(address),
                        None => Ok(relay),
                    }
                });
                match relay {
                    Ok(relay) => return Box::new(SmtpMailer::new(context, relay)),
                    Err(e) => log::warn!("SMTP relay unavailable, logging mail instead: {}", e),
                }
            }
            Ok(None) => log::info!("No SMTP credentials stored; run setup-email to send mail"),
            Err(e) => log::warn!("Could not read SMTP credentials: {}", e),
        }
    }
    Box::new(LogMailer::new(context, LogTransport))
}

fn build_service(config: &ServiceConfig) -> AccountResult<Service> {
    let store = JsonFileStore::open(&config.data_file)?;
    let signer = TokenSigner::new(&load_signing_secret()?, config.tokens.clone())?;

    Ok(AccountService::new(store, build_mailer(config), signer)
        .with_password_rounds(config.password_rounds)
        .with_max_page_size(config.max_page_size))
}

/// Session container seeded from the keyring, writing token changes back to it
fn session_container() -> StateContainer {
    let cache = match SessionCache::from_keyring() {
        Ok(cache) => Some(cache),
        Err(e) => {
            log::warn!("Session cache unavailable: {}", e);
            None
        }
    };

    let token = cache.as_ref().and_then(|cache| match cache.load() {
        Ok(token) => token,
        Err(e) => {
            log::warn!("Could not load saved session: {}", e);
            None
        }
    });
    let mut container = StateContainer::new(SessionState {
        token,
        ..SessionState::default()
    });

    if let Some(cache) = cache {
        container.subscribe(move |state: &SessionState, action: &Action| {
            let result = match action {
                Action::SetToken(_) | Action::SetUserAndToken { .. } | Action::SignOut => {
                    match &state.token {
                        Some(token) => cache.store(token),
                        None => cache.clear(),
                    }
                }
                _ => Ok(()),
            };
            if let Err(e) = result {
                log::warn!("Could not persist session: {}", e);
            }
        });
    }
    container
}

fn current_token(container: &StateContainer) -> AccountResult<SessionToken> {
    container
        .state()
        .token
        .clone()
        .ok_or(AccountError::MissingField("Token"))
}

// Resolves the saved session, signing out locally when the server rejects it
fn current_user(service: &Service, container: &mut StateContainer) -> AccountResult<PublicUser> {
    let token = current_token(container)?;
    match service.login_with_token(&token) {
        Ok(user) => {
            container.dispatch(Action::SetUser(Some(user.clone())));
            Ok(user)
        }
        Err(e) => {
            if matches!(
                e,
                AccountError::InvalidToken | AccountError::ExpiredToken | AccountError::UserNotFound
            ) {
                container.dispatch(Action::SignOut);
            }
            Err(e)
        }
    }
}

fn run(matches: &ArgMatches, config: &ServiceConfig) -> AccountResult<Value> {
    let (name, sub) = matches
        .subcommand()
        .ok_or(AccountError::MissingField("Command"))?;

    if name == "setup-email" {
        if sub.get_flag("remove") {
            SecureEmailManager::new()?.delete_credentials()?;
            return Ok(message("Email credentials removed"));
        }
        setup_email_credentials(&config.mail_from_name)?;
        return Ok(message("Email credentials saved"));
    }

    let service = build_service(config)?;
    let mut container = session_container();

    match name {
        "register" | "login" => {
            let email = text(sub, "email");
            let password = password(sub)?;
            let response = if name == "register" {
                service.register(email, &password)?
            } else {
                service.login(email, &password)?
            };
            container.dispatch(Action::SetUserAndToken {
                user: response.user.clone(),
                token: response.token.clone(),
            });
            to_json(&response)
        }
        "whoami" => to_json(&current_user(&service, &mut container)?),
        "logout" => {
            let token = current_token(&container)?;
            let result = service.logout(&token);
            // The local session goes away even if the server already forgot it
            container.dispatch(Action::SignOut);
            result?;
            Ok(message("Logged out"))
        }
        "verify" => {
            let user = service.verify_email(&VerificationToken::parse(text(sub, "token")))?;
            to_json(&user)
        }
        "resend-verification" => Ok(message(service.resend_verification(text(sub, "email"))?)),
        "forgot-password" => Ok(message(service.request_password_reset(text(sub, "email"))?)),
        "reset-password" => {
            let token = ResetToken::parse(text(sub, "token"));
            let password = password(sub)?;
            let outcome = service.complete_password_reset(&token, &password)?;
            container.dispatch(Action::SignOut);
            Ok(message(outcome))
        }
        "profile" => {
            let user = current_user(&service, &mut container)?;
            let profile = Profile {
                name: text(sub, "name").to_string(),
                team_code: sub.get_one::<String>("team").cloned(),
                affiliation: sub.get_one::<String>("affiliation").cloned(),
                github: sub.get_one::<String>("github").cloned(),
            };
            let updated = service.update_profile(&user.id, &profile)?;
            container.dispatch(Action::SetUser(Some(updated.clone())));
            to_json(&updated)
        }
        "submit" => {
            let user = current_user(&service, &mut container)?;
            let submission = Submission {
                code: text(sub, "code").to_string(),
                title: text(sub, "title").to_string(),
            };
            let updated = service.update_submission(&user.id, &submission)?;
            container.dispatch(Action::SetUser(Some(updated.clone())));
            to_json(&updated)
        }
        "list" => {
            let query = ListQuery {
                page: sub.get_one::<usize>("page").copied().unwrap_or(0),
                page_size: sub.get_one::<usize>("size").copied().unwrap_or(20),
                search: sub.get_one::<String>("search").cloned(),
            };
            container.dispatch(Action::FetchUsersStarted);
            match service.list_users(&query) {
                Ok(page) => {
                    container.dispatch(Action::FetchUsersSucceeded(page.users.clone()));
                    to_json(&page)
                }
                Err(e) => {
                    container.dispatch(Action::FetchUsersFailed);
                    Err(e)
                }
            }
        }
        "user" => {
            container.dispatch(Action::FetchUserStarted);
            match service.get_user(text(sub, "id")) {
                Ok(user) => {
                    container.dispatch(Action::FetchUserSucceeded(user.clone()));
                    to_json(&user)
                }
                Err(e) => {
                    container.dispatch(Action::FetchUserFailed);
                    Err(e)
                }
            }
        }
        other => Err(AccountError::Config(format!("Unknown command: {}", other))),
    }
}

fn load_config(matches: &ArgMatches) -> AccountResult<ServiceConfig> {
    let path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut config = ServiceConfig::load(Path::new(&path))?.with_env_overrides();
    if let Some(data) = matches.get_one::<String>("data") {
        config.data_file = PathBuf::from(data);
    }
    Ok(config)
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(_) => println!("{}", value),
    }
}

fn fail(error: &AccountError) -> i32 {
    print_json(&json!(ErrorBody::from(error)));
    if error.is_validation() {
        2
    } else {
        1
    }
}

fn main() {
    let matches = cli().get_matches();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e) => std::process::exit(fail(&e)),
    };

    if let Err(e) = initialize_logging(&config.log_level, config.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let code = match run(&matches, &config) {
        Ok(value) => {
            print_json(&value);
            0
        }
        Err(e) => {
            log::debug!("Command failed: {}", e);
            fail(&e)
        }
    };
    std::process::exit(code);
}
