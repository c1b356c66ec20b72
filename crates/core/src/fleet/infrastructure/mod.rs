pub mod http_fleet_source;
