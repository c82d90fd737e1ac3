use crate::cli::{Argument, CliApp, Command, ParseError};
use crate::controls::ActionId;
use clap::Parser;
use std::path::PathBuf;

fn parse(input: &str) -> Command {
    CliApp::parse_command(input).unwrap()
}

#[test]
fn test_parse_command_without_argument() {
    assert_eq!(
        parse("play"),
        Command {
            action: ActionId::Play,
            argument: Argument::None
        }
    );
    assert_eq!(parse("  PAUSE  ").action, ActionId::Pause);
    assert_eq!(parse("exit").action, ActionId::Quit);
    assert_eq!(parse("resume").action, ActionId::Play);
}

#[test]
fn test_parse_load_paths() {
    assert_eq!(
        parse("load /path/to/song.flac").argument,
        Argument::Path(PathBuf::from("/path/to/song.flac"))
    );

    // Paths with spaces, quoted or not
    assert_eq!(
        parse("load /path/to/my song.flac").argument,
        Argument::Path(PathBuf::from("/path/to/my song.flac"))
    );
    assert_eq!(
        parse("mix \"/music/b side.wav\"").argument,
        Argument::Path(PathBuf::from("/music/b side.wav"))
    );

    assert!(matches!(
        CliApp::parse_command("load"),
        Err(ParseError::MissingArgument { .. })
    ));
}

#[test]
fn test_parse_seek_and_jumps() {
    assert_eq!(parse("seek 1:30").argument, Argument::Seconds(90.0));
    assert_eq!(parse("seek 42s").argument, Argument::Seconds(42.0));
    assert_eq!(parse("ff").argument, Argument::None);
    assert_eq!(parse("rw 10").argument, Argument::Seconds(10.0));

    assert!(matches!(
        CliApp::parse_command("seek"),
        Err(ParseError::MissingArgument { .. })
    ));
    assert!(matches!(
        CliApp::parse_command("seek soon"),
        Err(ParseError::InvalidTimeFormat { .. })
    ));
}

#[test]
fn test_parse_loop_and_ab() {
    assert_eq!(parse("loop").argument, Argument::Toggle(None));
    assert_eq!(parse("loop on").argument, Argument::Toggle(Some(true)));
    assert_eq!(parse("loop OFF").argument, Argument::Toggle(Some(false)));
    assert!(CliApp::parse_command("loop maybe").is_err());

    assert_eq!(
        parse("ab 0:10 20").argument,
        Argument::Range {
            start: 10.0,
            end: 20.0
        }
    );
    assert!(matches!(
        CliApp::parse_command("ab 10"),
        Err(ParseError::MissingArgument { .. })
    ));
}

#[test]
fn test_parse_levels_and_speed() {
    assert_eq!(parse("vol 80").argument, Argument::Level(0.8));
    assert_eq!(parse("mixvol 25%").argument, Argument::Level(0.25));
    assert!(matches!(
        CliApp::parse_command("vol 150"),
        Err(ParseError::InvalidArgument { .. })
    ));
    assert!(CliApp::parse_command("vol loud").is_err());

    assert_eq!(parse("speed 1.5").argument, Argument::Ratio(1.5));
    assert_eq!(parse("speed 0.75x").argument, Argument::Ratio(0.75));
    assert!(CliApp::parse_command("speed -1").is_err());
}

#[test]
fn test_parse_markers_and_devices() {
    assert_eq!(parse("mark").argument, Argument::None);
    assert_eq!(parse("mark big drop").argument, Argument::Text("big drop".to_string()));
    assert_eq!(parse("goto 3").argument, Argument::Index(2));
    assert!(CliApp::parse_command("goto 0").is_err());
    assert!(CliApp::parse_command("unmark").is_err());

    assert_eq!(
        parse("device Built-in Output").argument,
        Argument::Text("Built-in Output".to_string())
    );
}

#[test]
fn test_parse_errors() {
    assert!(matches!(CliApp::parse_command("   "), Err(ParseError::EmptyCommand)));
    match CliApp::parse_command("frobnicate now") {
        Err(ParseError::UnknownCommand { command }) => assert_eq!(command, "frobnicate"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_time_formats() {
    assert_eq!(CliApp::parse_time("0:00").unwrap(), 0.0);
    assert_eq!(CliApp::parse_time("2:05.5").unwrap(), 125.5);
    assert_eq!(CliApp::parse_time("90").unwrap(), 90.0);
    assert!(CliApp::parse_time("1:75").is_err());
    assert!(CliApp::parse_time("1:2:3").is_err());
    assert!(CliApp::parse_time("-5").is_err());
    assert!(CliApp::parse_time("").is_err());
}

#[test]
fn test_command_line_arguments() {
    let args = CliApp::try_parse_from(["mixdeck", "song.flac", "--mixer", "beat.wav", "--no-restore"]).unwrap();
    assert_eq!(args.file, Some(PathBuf::from("song.flac")));
    assert_eq!(args.mixer, Some(PathBuf::from("beat.wav")));
    assert!(args.no_restore);
    assert!(!args.autoplay);
    assert_eq!(args.session, None);

    let args = CliApp::try_parse_from(["mixdeck"]).unwrap();
    assert_eq!(args.file, None);
}

#[test]
fn test_expand_path() {
    let expanded = CliApp::expand_path("~/Documents/Music");
    assert!(!expanded.to_string_lossy().starts_with('~'));
    assert!(expanded.to_string_lossy().contains("Documents/Music"));

    assert_eq!(CliApp::expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
    assert_eq!(CliApp::expand_path("relative/path"), PathBuf::from("relative/path"));
}
