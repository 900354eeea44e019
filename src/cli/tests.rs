use super::*;
use tempfile::TempDir;

fn parse_args(argv: &[&str]) -> Args {
    Args::try_parse_from(argv)
        .unwrap_or_else(|err| panic!("argv={argv:?} should parse successfully: {err}"))
}

const CAPTURE: &str = concat!(
    "data: {\"choices\":[{\"delta\":{\"content\":\"Hi, I'm\"}}]}\n\n",
    "data: {\"choices\":[{\"delta\":{\"content\":\" here.\"}}]}\n\n",
    "data: oops\n\n",
    "data: {\"choices\":[{\"delta\":{\"function_call\":{\"name\":\"get_training_data\",\"arguments\":\"{}\"}},\"finish_reason\":\"function_call\"}]}\n\n",
    "data: [DONE]\n\n",
);

#[test]
fn no_subcommand_means_serve() {
    let args = parse_args(&["chatfolio"]);
    assert!(args.command.is_none());
    assert!(args.config.is_none());
}

#[test]
fn serve_accepts_host_and_port() {
    let args = parse_args(&["chatfolio", "serve", "--host", "0.0.0.0", "-p", "8080"]);
    match args.command {
        Some(Commands::Serve { host, port }) => {
            assert_eq!(host.as_deref(), Some("0.0.0.0"));
            assert_eq!(port, Some(8080));
        }
        _ => panic!("expected serve subcommand"),
    }
}

#[test]
fn config_flag_is_global() {
    let args = parse_args(&["chatfolio", "config", "init", "--config", "/tmp/x.toml"]);
    assert_eq!(args.config, Some(PathBuf::from("/tmp/x.toml")));
    assert!(matches!(
        args.command,
        Some(Commands::Config {
            action: Some(ConfigAction::Init)
        })
    ));
}

#[test]
fn replay_takes_optional_file_and_tokens_flag() {
    let args = parse_args(&["chatfolio", "replay", "--tokens"]);
    match args.command {
        Some(Commands::Replay { file, tokens }) => {
            assert!(file.is_none());
            assert!(tokens);
        }
        _ => panic!("expected replay subcommand"),
    }
}

#[test]
fn invalid_port_is_rejected() {
    assert!(Args::try_parse_from(["chatfolio", "serve", "--port", "99999"]).is_err());
}

#[test]
fn replay_prints_joined_text() {
    let mut out = Vec::new();
    let stats = replay::replay(CAPTURE.as_bytes(), false, &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    assert_eq!(
        text,
        "Hi, I'm here.{\"function_call\":{\"name\":\"get_training_data\",\"arguments\":\"{}\"}}\n"
    );
    assert_eq!(stats.skipped_lines, 1);
    assert_eq!(stats.function_calls, 1);
}

#[test]
fn replay_can_list_tokens() {
    let mut out = Vec::new();
    replay::replay(CAPTURE.as_bytes(), true, &mut out).unwrap();

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<_> = text.lines().collect();
    assert_eq!(lines[0], "Word(\"Hi\")");
    assert_eq!(lines[1], "Symbol(',')");
    assert_eq!(lines[3], "Word(\"I'm\")");
    assert!(lines.last().unwrap().starts_with("FunctionCall("));
}

#[test]
fn config_init_writes_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("config.toml");
    let path_arg = path.to_string_lossy().to_string();

    run(parse_args(&["chatfolio", "config", "init", "--config", &path_arg]))
        .expect("first init succeeds");
    assert!(path.exists());
    assert_eq!(
        Config::load_from_path(&path).expect("written config loads"),
        Config::default()
    );

    let err = run(parse_args(&["chatfolio", "config", "init", "--config", &path_arg]))
        .expect_err("second init refuses to overwrite");
    assert!(err.to_string().contains("already exists"));
}
