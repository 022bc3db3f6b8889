use super::*;

#[test]
fn defaults_match_the_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.to_string(), "127.0.0.1:3002");
    assert_eq!(settings.server.graceful_shutdown, Duration::from_secs(30));
    assert_eq!(settings.server.max_request_bytes, 16 * 1024 * 1024);
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert!(matches!(settings.logging.format, LogFormat::Compact));

    assert_eq!(settings.render.cli_path, PathBuf::from("montage-renderer"));
    assert_eq!(
        settings.render.entry_point,
        PathBuf::from("remotion/Root.tsx")
    );
    assert_eq!(settings.render.composition, "VideoComposition");
    assert_eq!(settings.render.output_dir, PathBuf::from("public/renders"));
    assert_eq!(settings.render.public_base_url, "http://localhost:3002");
    assert_eq!(settings.render.video_codec, "h264");
    assert_eq!(settings.render.audio_codec, "mp3");
    assert_eq!(settings.render.audio_bitrate, "320k");

    assert_eq!(settings.jobs.max_concurrent_renders.get(), 2);
    assert_eq!(settings.jobs.retention, Duration::from_secs(86_400));
    assert_eq!(settings.jobs.sweep_interval, Duration::from_secs(60));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.render.composition = Some("FromFile".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        logging: LoggingOverrides {
            log_level: Some("debug".to_string()),
            ..Default::default()
        },
        render: RenderOverrides {
            composition: Some("FromCli".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.render.composition, "FromCli");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        logging: LoggingOverrides {
            log_json: Some(true),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn public_base_url_loses_trailing_slash() {
    let mut raw = RawSettings::default();
    raw.render.public_base_url = Some("https://videos.example.com/".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.render.public_base_url, "https://videos.example.com");
}

#[test]
fn rejects_invalid_values() {
    let cases: Vec<(&str, Box<dyn Fn(&mut RawSettings)>)> = vec![
        (
            "server.port",
            Box::new(|raw: &mut RawSettings| raw.server.port = Some(0)),
        ),
        (
            "server.max_request_bytes",
            Box::new(|raw: &mut RawSettings| raw.server.max_request_bytes = Some(0)),
        ),
        (
            "logging.level",
            Box::new(|raw: &mut RawSettings| raw.logging.level = Some("loud".to_string())),
        ),
        (
            "render.composition",
            Box::new(|raw: &mut RawSettings| raw.render.composition = Some("  ".to_string())),
        ),
        (
            "render.public_base_url",
            Box::new(|raw: &mut RawSettings| {
                raw.render.public_base_url = Some("localhost:3002".to_string())
            }),
        ),
        (
            "jobs.max_concurrent_renders",
            Box::new(|raw: &mut RawSettings| raw.jobs.max_concurrent_renders = Some(0)),
        ),
        (
            "jobs.sweep_interval_seconds",
            Box::new(|raw: &mut RawSettings| raw.jobs.sweep_interval_seconds = Some(0)),
        ),
    ];

    for (expected_key, mutate) in cases {
        let mut raw = RawSettings::default();
        mutate(&mut raw);
        match Settings::from_raw(raw) {
            Err(LoadError::Invalid { key, .. }) => assert_eq!(key, expected_key),
            other => panic!("expected invalid `{expected_key}`, got {other:?}"),
        }
    }
}

#[test]
fn zero_retention_is_allowed() {
    let mut raw = RawSettings::default();
    raw.jobs.retention_seconds = Some(0);

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.jobs.retention, Duration::ZERO);
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["montage"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_arguments() {
    let args = CliArgs::parse_from([
        "montage",
        "serve",
        "--server-port",
        "8080",
        "--render-cli-path",
        "/usr/local/bin/renderer",
        "--jobs-max-concurrent-renders",
        "4",
        "--log-json",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_port, Some(8080));
            assert_eq!(
                serve.overrides.render.cli_path.as_deref(),
                Some(std::path::Path::new("/usr/local/bin/renderer"))
            );
            assert_eq!(serve.overrides.jobs_max_concurrent_renders, Some(4));
            assert_eq!(serve.overrides.logging.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "montage",
        "render",
        "design.json",
        "--fps",
        "60",
        "--width",
        "1280",
        "--height",
        "720",
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.design, PathBuf::from("design.json"));
            assert_eq!(render.fps, Some(60));
            assert_eq!(render.width, Some(1280));
            assert_eq!(render.height, Some(720));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn render_width_requires_height() {
    let result = CliArgs::try_parse_from(["montage", "render", "design.json", "--width", "1280"]);
    assert!(result.is_err());
}

#[test]
#[serial_test::serial]
fn environment_layers_under_cli_overrides() {
    // SAFETY: serialised with every other test that touches the environment.
    unsafe {
        std::env::set_var("MONTAGE__SERVER__PORT", "4100");
        std::env::set_var("MONTAGE__RENDER__COMPOSITION", "EnvComposition");
    }

    let args = CliArgs::parse_from(["montage", "serve", "--server-port", "4200"]);
    let result = load(&args);

    unsafe {
        std::env::remove_var("MONTAGE__SERVER__PORT");
        std::env::remove_var("MONTAGE__RENDER__COMPOSITION");
    }

    let settings = result.expect("valid settings");
    assert_eq!(settings.server.addr.port(), 4200);
    assert_eq!(settings.render.composition, "EnvComposition");
}
