pub mod company;
pub mod job;
pub mod match_log;
pub mod match_session;
pub mod scrape_session;
pub mod scraping_log;
pub mod setting;
