//! Unit tests for CLI commands

use crate::cli::{parse_key_val, Cli, Commands};
use clap::Parser;

#[test]
fn test_inspect_command_parses() {
    let cli = Cli::try_parse_from(["asyncapi-pub", "inspect", "--spec", "api.yaml"]).unwrap();
    match cli.command {
        Commands::Inspect { spec, .. } => assert_eq!(spec.to_string_lossy(), "api.yaml"),
        Commands::Publish { .. } => panic!("Expected Inspect command"),
    }
}

#[test]
fn test_publish_command_collects_headers_and_options() {
    let cli = Cli::try_parse_from([
        "asyncapi-pub",
        "publish",
        "--spec",
        "api.yaml",
        "--topic",
        "events/42",
        "--message",
        r#"{"status":"started"}"#,
        "--header",
        "traceId=abc",
        "--header",
        "retries=3",
        "--option",
        "priority=5",
    ])
    .unwrap();

    match cli.command {
        Commands::Publish {
            topic,
            headers,
            options,
            ..
        } => {
            assert_eq!(topic, "events/42");
            assert_eq!(
                headers,
                vec![
                    ("traceId".to_string(), "abc".to_string()),
                    ("retries".to_string(), "3".to_string())
                ]
            );
            assert_eq!(options, vec![("priority".to_string(), "5".to_string())]);
        }
        Commands::Inspect { .. } => panic!("Expected Publish command"),
    }
}

#[test]
fn test_publish_requires_topic() {
    let cli = Cli::try_parse_from([
        "asyncapi-pub",
        "publish",
        "--spec",
        "api.yaml",
        "--message",
        "{}",
    ]);
    assert!(cli.is_err());
}

#[test]
fn test_parse_key_val() {
    assert_eq!(
        parse_key_val("a=b=c").unwrap(),
        ("a".to_string(), "b=c".to_string())
    );
    assert_eq!(parse_key_val("empty=").unwrap(), ("empty".to_string(), String::new()));
    assert!(parse_key_val("novalue").is_err());
    assert!(parse_key_val("=x").is_err());
}
