mod bean_managed;
mod propagation;
mod scenarios;
mod support;
