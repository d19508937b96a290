use bytes::BytesMut;
use redpipe_resp::ParseOutcome;
use redpipe_resp::Parser;

fn main() {
    println!("--- RESP Streaming Parse Example ---");

    // Simulate a TCP stream with fragmented data
    // We are sending:
    // - A Simple String: "+OK\r\n"
    // - An Integer: ":1000\r\n"
    // - An Array: "*2\r\n$3\r\nfoo\r\n$-1\r\n"
    // - But split into random chunks.
    let data_chunks = vec![
        b"+O".as_slice(),
        b"K\r\n:1".as_slice(),
        b"00".as_slice(),
        b"0\r\n*2\r\n$3\r\nfo".as_slice(),
        b"o\r\n$-".as_slice(),
        b"1\r\n".as_slice(),
    ];

    let mut parser = Parser::new();
    let mut buffer = BytesMut::new();

    for (i, chunk) in data_chunks.iter().enumerate() {
        println!(
            "\n[Stream] Received Chunk {}: {:?}",
            i,
            String::from_utf8_lossy(chunk)
        );

        buffer.extend_from_slice(chunk);

        loop {
            match parser.parse(&mut buffer) {
                ParseOutcome::Complete(value) => {
                    println!("[Parser] Complete: {:?}", value);
                    // Keep draining in case the chunk finished several values
                }
                ParseOutcome::Incomplete => {
                    println!("[Parser] Incomplete, waiting for more data...");
                    break;
                }
                ParseOutcome::Error(e) => {
                    eprintln!("[Parser] Error: {:?}", e);
                    return;
                }
            }
        }
    }
}
