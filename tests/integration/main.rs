//! Integration tests for Social-Harvest

mod harvest_tests;
