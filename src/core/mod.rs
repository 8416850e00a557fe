pub mod club;
pub mod db;
pub mod matches;
pub mod player;
pub mod rating;
pub mod settings;
pub mod tournament;
