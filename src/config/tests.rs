use super::*;

#[test]
fn defaults_are_valid() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
    assert_eq!(settings.site.url, DEFAULT_SITE_URL);
    assert_eq!(settings.storage.directory, PathBuf::from(DEFAULT_MEDIA_DIR));
    assert_eq!(
        settings.storage.cache_ttl,
        Duration::from_secs(2_592_000)
    );
    assert_eq!(settings.assets.base_url, "/static/nbpress");
    assert!(settings.fetch.user_agent.starts_with("nbpress/"));
    assert!(settings.store.path.is_none());
    assert!(matches!(settings.logging.format, LogFormat::Compact));
}

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.storage.cache_ttl_seconds = Some(60);

    let overrides = ServeOverrides {
        server_port: Some(4321),
        pipeline: PipelineOverrides {
            log_level: Some("debug".to_string()),
            cache_ttl_seconds: Some(120),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.storage.cache_ttl, Duration::from_secs(120));
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        pipeline: PipelineOverrides {
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
fn site_url_trailing_slash_is_stripped() {
    let mut raw = RawSettings::default();
    raw.site.url = Some("https://blog.example/".to_string());
    raw.storage.public_path = Some("/media/nb/".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.site.url, "https://blog.example");
    assert_eq!(
        settings.storage.public_base_url(&settings.site),
        "https://blog.example/media/nb"
    );
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.storage.cache_ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero ttl");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "storage.cache_ttl_seconds",
            ..
        }
    ));
}

#[test]
fn traversal_in_public_path_is_rejected() {
    let mut raw = RawSettings::default();
    raw.storage.public_path = Some("uploads/../secret".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn non_http_site_url_is_rejected() {
    let mut raw = RawSettings::default();
    raw.site.url = Some("ftp://blog.example".to_string());

    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["nbpress"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "nbpress",
        "render",
        "--cache-ttl-seconds",
        "10",
        "https://github.com/user/repo/blob/main/a.ipynb",
    ]);

    match args.command.expect("render command") {
        Command::Render(render) => {
            assert_eq!(render.url, "https://github.com/user/repo/blob/main/a.ipynb");
            assert_eq!(render.pipeline.cache_ttl_seconds, Some(10));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_sync_arguments() {
    let id = Uuid::new_v4();
    let id_arg = id.to_string();
    let args = CliArgs::parse_from([
        "nbpress",
        "sync",
        "--store-path",
        "/tmp/posts.json",
        id_arg.as_str(),
    ]);

    match args.command.expect("sync command") {
        Command::Sync(sync) => {
            assert_eq!(sync.post_id, id);
            assert_eq!(
                sync.store_path.as_deref(),
                Some(std::path::Path::new("/tmp/posts.json"))
            );
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "nbpress",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--site-url",
        "https://blog.example",
        "--log-json",
        "true",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.site_url.as_deref(),
                Some("https://blog.example")
            );
            assert_eq!(serve.overrides.pipeline.log_json, Some(true));
        }
        _ => panic!("wrong command parsed"),
    }
}
