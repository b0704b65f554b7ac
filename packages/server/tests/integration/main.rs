mod common;

mod merchant;
