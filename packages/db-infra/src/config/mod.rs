pub mod db;
pub mod url;
