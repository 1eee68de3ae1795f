pub mod mailtext_config;
