use dotenvy::dotenv;
use std::env;

/// Environment-driven configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub database_url: String,
    pub admin_ids: Vec<i64>,
}

impl Config {
    pub fn from_env() -> Config {
        dotenv().ok();
        let bot_token = env::var("BOT_TOKEN").expect("BOT_TOKEN not set");
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL not set");
        let admin_ids = parse_admin_ids(&env::var("ADMIN_IDS").unwrap_or_default());
        if admin_ids.is_empty() {
            warn!("ADMIN_IDS is empty, admin commands will be unusable");
        }
        Config {
            bot_token,
            database_url,
            admin_ids,
        }
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

fn parse_admin_ids(raw: &str) -> Vec<i64> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::parse_admin_ids;

    #[test]
    fn parses_comma_separated_ids() {
        assert_eq!(parse_admin_ids("1,22, 333"), vec![1, 22, 333]);
    }

    #[test]
    fn skips_empty_and_garbage_entries() {
        assert_eq!(parse_admin_ids(""), Vec::<i64>::new());
        assert_eq!(parse_admin_ids("7,,abc,8"), vec![7, 8]);
    }
}
