pub mod counter_postgres;
