fn main() {
    ddmq::app::startup::startup();
}
