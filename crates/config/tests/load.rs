use app_config::AppConfig;

#[test]
fn test_load_default_config() {
    let cfg = AppConfig::load().unwrap();
    assert_eq!(cfg.db_host, "localhost");
    assert_eq!(cfg.db_port, 5432);
    assert_eq!(cfg.http_port, 8081);
}
