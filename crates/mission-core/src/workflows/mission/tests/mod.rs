mod common;

mod pricing;
